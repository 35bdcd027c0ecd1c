//! Media classification: policy resolution, content validation and hashing.

use crate::hashing::{exact_digest, perceptual_digest};
use crate::{ContentDigest, HashAlgorithm, MediaPolicy, PolicyTable};
use insignia_error::{InsigniaResult, ValidationError, ValidationErrorKind};

/// Longest accepted link name, in bytes.
pub const MAX_LINK_NAME_BYTES: usize = 255;

/// Content type detected from magic bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_getters::Getters)]
pub struct ContentType {
    /// MIME type, e.g. `image/png`
    mime: String,
    /// Canonical file extension, e.g. `png`
    extension: String,
}

impl ContentType {
    /// Create a content type.
    pub fn new(mime: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            mime: mime.into(),
            extension: extension.into(),
        }
    }
}

/// Stateless classifier over a [`PolicyTable`].
///
/// # Examples
///
/// ```
/// use insignia_core::{MediaClassifier, PolicyTable};
///
/// let classifier = MediaClassifier::new(PolicyTable::builtin());
/// let font = classifier.resolve("font").unwrap();
///
/// // TrueType magic followed by padding.
/// let bytes = [0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80];
/// let content_type = classifier.validate(&bytes, font).unwrap();
/// assert_eq!(content_type.mime(), "application/font-sfnt");
///
/// let digest = classifier.hash(&bytes, font).unwrap();
/// assert_eq!(digest.as_str().len(), 64);
///
/// assert!(classifier.resolve("banner").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MediaClassifier {
    policies: PolicyTable,
}

impl MediaClassifier {
    /// Create a classifier over a policy table.
    pub fn new(policies: PolicyTable) -> Self {
        Self { policies }
    }

    /// The underlying policy table.
    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// Resolve a declared media class to its policy.
    ///
    /// # Errors
    ///
    /// `UnknownMediaClass` for names not in the table.
    pub fn resolve(&self, media_class: &str) -> InsigniaResult<&MediaPolicy> {
        self.policies.resolve(media_class)
    }

    /// Check content against a policy and return its detected type.
    ///
    /// The size check runs first so oversized uploads are rejected without
    /// inspecting them.
    ///
    /// # Errors
    ///
    /// - `ContentTooLarge` when the content exceeds the policy's limit
    /// - `InvalidContentType` when the detected type is not accepted, including
    ///   content whose type cannot be detected at all
    pub fn validate(&self, bytes: &[u8], policy: &MediaPolicy) -> InsigniaResult<ContentType> {
        let size = bytes.len() as u64;
        if size > *policy.max_size() {
            return Err(ValidationError::new(ValidationErrorKind::ContentTooLarge {
                media_class: policy.media_class().clone(),
                size,
                max: *policy.max_size(),
            })
            .into());
        }

        match infer::get(bytes) {
            Some(kind) if policy.accepts(kind.mime_type()) => {
                Ok(ContentType::new(kind.mime_type(), kind.extension()))
            }
            detected => Err(invalid_content_type(
                policy,
                detected.map_or("unknown", |kind| kind.mime_type()),
            )),
        }
    }

    /// Check that a link name is a single safe path component.
    ///
    /// # Errors
    ///
    /// `InvalidLinkName` for empty names, names containing a path separator or
    /// NUL, the special names `.` and `..`, and names longer than
    /// [`MAX_LINK_NAME_BYTES`].
    pub fn validate_name(&self, name: &str) -> InsigniaResult<()> {
        let reason = if name.is_empty() {
            Some("name is empty")
        } else if name == "." || name == ".." {
            Some("name is a relative directory reference")
        } else if name.contains(['/', '\\']) {
            Some("name contains a path separator")
        } else if name.contains('\0') {
            Some("name contains NUL")
        } else if name.len() > MAX_LINK_NAME_BYTES {
            Some("name exceeds 255 bytes")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(ValidationError::new(ValidationErrorKind::InvalidLinkName {
                name: name.to_string(),
                reason: reason.to_string(),
            })
            .into()),
            None => Ok(()),
        }
    }

    /// Compute the deduplication digest for content under a policy.
    ///
    /// # Errors
    ///
    /// `InvalidContentType` when a perceptual-image policy is given bytes that
    /// do not decode as an image. The reported type carries the decode
    /// failure, e.g. `image/png (undecodable: ...)`.
    pub fn hash(&self, bytes: &[u8], policy: &MediaPolicy) -> InsigniaResult<ContentDigest> {
        match policy.hash_algorithm() {
            HashAlgorithm::ExactContent => Ok(exact_digest(bytes)),
            HashAlgorithm::PerceptualImage => perceptual_digest(bytes).map_err(|e| {
                tracing::debug!(media_class = %policy.media_class(), error = %e, "Image failed to decode");
                let detected = infer::get(bytes).map_or("unknown", |kind| kind.mime_type());
                invalid_content_type(policy, &format!("{detected} (undecodable: {e})"))
            }),
        }
    }
}

fn invalid_content_type(policy: &MediaPolicy, detected: &str) -> insignia_error::InsigniaError {
    ValidationError::new(ValidationErrorKind::InvalidContentType {
        media_class: policy.media_class().clone(),
        detected: detected.to_string(),
        accepted: policy.accepted_types().clone(),
    })
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use insignia_error::InsigniaErrorKind;

    const TTF_MAGIC: [u8; 8] = [0x00, 0x01, 0x00, 0x00, 0x00, 0x0a, 0x00, 0x80];

    fn classifier() -> MediaClassifier {
        MediaClassifier::new(PolicyTable::builtin())
    }

    fn validation_kind(err: insignia_error::InsigniaError) -> ValidationErrorKind {
        match err.kind() {
            InsigniaErrorKind::Validation(e) => e.kind.clone(),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn rejects_undetectable_content() {
        let c = classifier();
        let policy = c.resolve("team-logo").unwrap();
        let kind = validation_kind(c.validate(b"hello world", policy).unwrap_err());
        assert!(matches!(
            kind,
            ValidationErrorKind::InvalidContentType { ref detected, .. } if detected == "unknown"
        ));
    }

    #[test]
    fn rejects_font_under_image_class() {
        let c = classifier();
        let policy = c.resolve("clan-badge").unwrap();
        let kind = validation_kind(c.validate(&TTF_MAGIC, policy).unwrap_err());
        assert!(matches!(
            kind,
            ValidationErrorKind::InvalidContentType { ref detected, .. } if detected == "application/font-sfnt"
        ));
    }

    #[test]
    fn size_limit_is_inclusive() {
        let policy = MediaPolicy::new("font", HashAlgorithm::ExactContent, ["application/font-sfnt"])
            .with_max_size(TTF_MAGIC.len() as u64);
        let c = MediaClassifier::new(PolicyTable::from_policies([policy.clone()]));

        let content_type = c.validate(&TTF_MAGIC, &policy).unwrap();
        assert_eq!(content_type.extension(), "ttf");

        let mut oversized = TTF_MAGIC.to_vec();
        oversized.push(0);
        let kind = validation_kind(c.validate(&oversized, &policy).unwrap_err());
        assert_eq!(
            kind,
            ValidationErrorKind::ContentTooLarge {
                media_class: "font".to_string(),
                size: 9,
                max: 8,
            }
        );
    }

    #[test]
    fn link_names_must_be_single_components() {
        let c = classifier();
        for bad in ["", ".", "..", "a/b", "..\\x", "nul\0byte"] {
            let kind = validation_kind(c.validate_name(bad).unwrap_err());
            assert!(
                matches!(kind, ValidationErrorKind::InvalidLinkName { .. }),
                "{bad:?} should be rejected"
            );
        }
        assert!(c.validate_name(&"a".repeat(MAX_LINK_NAME_BYTES + 1)).is_err());

        assert!(c.validate_name("alpha.png").is_ok());
        assert!(c.validate_name("..hidden").is_ok());
        assert!(c.validate_name(&"a".repeat(MAX_LINK_NAME_BYTES)).is_ok());
    }

    #[test]
    fn exact_hash_depends_only_on_bytes() {
        let c = classifier();
        let font = c.resolve("font").unwrap();
        assert_eq!(c.hash(&TTF_MAGIC, font).unwrap(), c.hash(&TTF_MAGIC, font).unwrap());
        assert_ne!(c.hash(&TTF_MAGIC, font).unwrap(), c.hash(&TTF_MAGIC[..7], font).unwrap());
    }

    #[test]
    fn perceptual_hash_of_garbage_is_invalid_content() {
        let c = classifier();
        let policy = c.resolve("team-logo").unwrap();
        let kind = validation_kind(c.hash(b"\x89PNG\r\n\x1a\ntruncated", policy).unwrap_err());
        assert!(matches!(
            kind,
            ValidationErrorKind::InvalidContentType { ref detected, .. }
                if detected.starts_with("image/png (undecodable")
        ));
    }
}
