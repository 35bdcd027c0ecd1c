//! Table-driven media class policies.
//!
//! Every class-specific behavior (accepted types, size cap, hashing strategy,
//! default expiry, on-disk layout) lives in a [`MediaPolicy`] row. Adding a
//! media class is a configuration change, not a code change.

use crate::BlobId;
use insignia_error::{InsigniaResult, ValidationError, ValidationErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default size limit for every built-in class: 8 MiB.
pub const DEFAULT_MAX_SIZE: u64 = 8 * 1024 * 1024;

const IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg"];
const FONT_TYPES: &[&str] = &["application/font-sfnt"];

/// Half a year, in seconds.
const TEAM_LOGO_TTL: u64 = 15_778_800;

/// Hashing strategy selected by a policy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    /// Block-mean perceptual fingerprint of the decoded grayscale image
    #[display("perceptual-image")]
    PerceptualImage,
    /// SHA-256 of the raw bytes
    #[display("exact-content")]
    ExactContent,
}

/// Policy for one media class.
///
/// # Examples
///
/// ```
/// use insignia_core::{HashAlgorithm, MediaPolicy};
/// use std::time::Duration;
///
/// let policy = MediaPolicy::new("sponsor-logo", HashAlgorithm::PerceptualImage, ["image/png"])
///     .with_max_size(1024 * 1024)
///     .with_ttl(Duration::from_secs(3600));
///
/// assert_eq!(policy.media_class(), "sponsor-logo");
/// assert_eq!(policy.ttl(), Some(Duration::from_secs(3600)));
/// assert!(policy.accepts("image/png"));
/// assert!(!policy.accepts("image/gif"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
#[serde(deny_unknown_fields)]
pub struct MediaPolicy {
    /// Class name, e.g. `team-logo`.
    media_class: String,

    /// MIME types accepted, as detected from the content's magic bytes.
    accepted_types: Vec<String>,

    /// Maximum size in bytes (default 8 MiB).
    #[serde(default = "default_max_size")]
    max_size: u64,

    /// Hashing strategy.
    hash_algorithm: HashAlgorithm,

    /// Default link lifetime in seconds; `None` means links never expire.
    #[serde(default)]
    ttl_seconds: Option<u64>,

    /// Blob location relative to the blob root.
    ///
    /// Placeholders: `{class}`, `{blob_id}`, `{extension}`.
    #[serde(default = "default_storage_template")]
    storage_template: String,

    /// Link location relative to the link root.
    ///
    /// Placeholders: `{class}`, `{name}`.
    #[serde(default = "default_link_template")]
    link_template: String,
}

fn default_max_size() -> u64 {
    DEFAULT_MAX_SIZE
}

fn default_storage_template() -> String {
    "{class}/{blob_id}.{extension}".to_string()
}

fn default_link_template() -> String {
    "{class}s/{name}".to_string()
}

impl MediaPolicy {
    /// Create a policy with default size limit, no expiry and default layout.
    pub fn new<I, S>(media_class: impl Into<String>, hash_algorithm: HashAlgorithm, accepted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            media_class: media_class.into(),
            accepted_types: accepted.into_iter().map(Into::into).collect(),
            max_size: DEFAULT_MAX_SIZE,
            hash_algorithm,
            ttl_seconds: None,
            storage_template: default_storage_template(),
            link_template: default_link_template(),
        }
    }

    /// Set the size limit.
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the default link lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_seconds = Some(ttl.as_secs());
        self
    }

    /// Set the blob layout template.
    pub fn with_storage_template(mut self, template: impl Into<String>) -> Self {
        self.storage_template = template.into();
        self
    }

    /// Set the link layout template.
    pub fn with_link_template(mut self, template: impl Into<String>) -> Self {
        self.link_template = template.into();
        self
    }

    /// Default link lifetime, if links of this class expire.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_seconds.map(Duration::from_secs)
    }

    /// Whether a detected MIME type is accepted.
    pub fn accepts(&self, mime: &str) -> bool {
        self.accepted_types.iter().any(|t| t == mime)
    }

    /// Blob location for a blob of this class, relative to the blob root.
    pub fn storage_path(&self, blob_id: &BlobId, extension: &str) -> PathBuf {
        PathBuf::from(
            self.storage_template
                .replace("{class}", &self.media_class)
                .replace("{blob_id}", &blob_id.to_string())
                .replace("{extension}", extension),
        )
    }

    /// Link location for a name in this class, relative to the link root.
    pub fn link_path(&self, name: &str) -> PathBuf {
        PathBuf::from(
            self.link_template
                .replace("{class}", &self.media_class)
                .replace("{name}", name),
        )
    }
}

/// Lookup table of media policies keyed by class name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PolicyTable {
    policies: BTreeMap<String, MediaPolicy>,
}

impl PolicyTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in classes: five logo/badge image classes, templates and fonts.
    ///
    /// Team logos expire after half a year; everything else is kept until
    /// explicitly deleted.
    pub fn builtin() -> Self {
        let image_class = |class: &str| MediaPolicy::new(class, HashAlgorithm::PerceptualImage, IMAGE_TYPES.iter().copied());

        Self::from_policies([
            image_class("team-logo").with_ttl(Duration::from_secs(TEAM_LOGO_TTL)),
            image_class("clan-badge"),
            image_class("tournament-logo"),
            image_class("league-logo"),
            image_class("creator-logo"),
            image_class(crate::TEMPLATE_MEDIA_CLASS),
            MediaPolicy::new("font", HashAlgorithm::ExactContent, FONT_TYPES.iter().copied()),
        ])
    }

    /// Build a table from policies; later entries replace earlier ones of the same class.
    pub fn from_policies(policies: impl IntoIterator<Item = MediaPolicy>) -> Self {
        let mut table = Self::new();
        table.merge(policies);
        table
    }

    /// Insert or replace policies by class name.
    pub fn merge(&mut self, policies: impl IntoIterator<Item = MediaPolicy>) {
        for policy in policies {
            self.policies.insert(policy.media_class.clone(), policy);
        }
    }

    /// Look up a class.
    ///
    /// # Errors
    ///
    /// `UnknownMediaClass` if the class is not in the table.
    pub fn resolve(&self, media_class: &str) -> InsigniaResult<&MediaPolicy> {
        self.policies.get(media_class).ok_or_else(|| {
            ValidationError::new(ValidationErrorKind::UnknownMediaClass(media_class.to_string()))
                .into()
        })
    }

    /// Class names in sorted order.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// True if no classes are configured.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_matches_class_list() {
        let table = PolicyTable::builtin();
        let classes: Vec<_> = table.classes().collect();
        assert_eq!(
            classes,
            [
                "clan-badge",
                "creator-logo",
                "font",
                "league-logo",
                "team-logo",
                "template",
                "tournament-logo"
            ]
        );
    }

    #[test]
    fn only_team_logos_expire_by_default() {
        let table = PolicyTable::builtin();
        for class in table.classes() {
            let policy = table.resolve(class).unwrap();
            if class == "team-logo" {
                assert_eq!(policy.ttl(), Some(Duration::from_secs(15_778_800)));
            } else {
                assert_eq!(policy.ttl(), None, "{class} should not expire");
            }
        }
    }

    #[test]
    fn fonts_hash_exactly() {
        let table = PolicyTable::builtin();
        assert_eq!(
            *table.resolve("font").unwrap().hash_algorithm(),
            HashAlgorithm::ExactContent
        );
        assert_eq!(
            *table.resolve("clan-badge").unwrap().hash_algorithm(),
            HashAlgorithm::PerceptualImage
        );
    }

    #[test]
    fn unknown_class_is_a_validation_error() {
        let err = PolicyTable::builtin().resolve("banner").unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("banner"));
    }

    #[test]
    fn paths_render_from_templates() {
        let table = PolicyTable::builtin();
        let policy = table.resolve("team-logo").unwrap();
        let id: BlobId = "67e55044-10b1-426f-9247-bb680e5fe0c8".parse().unwrap();

        assert_eq!(
            policy.storage_path(&id, "png"),
            PathBuf::from("team-logo/67e55044-10b1-426f-9247-bb680e5fe0c8.png")
        );
        assert_eq!(policy.link_path("alpha.png"), PathBuf::from("team-logos/alpha.png"));
    }

    #[test]
    fn merge_replaces_by_class() {
        let mut table = PolicyTable::builtin();
        table.merge([MediaPolicy::new("font", HashAlgorithm::ExactContent, ["application/font-woff"])]);
        assert_eq!(table.len(), 7);
        assert!(table.resolve("font").unwrap().accepts("application/font-woff"));
        assert!(!table.resolve("font").unwrap().accepts("application/font-sfnt"));
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let policy: MediaPolicy = toml::from_str(
            r#"
            media_class = "sponsor-logo"
            accepted_types = ["image/png"]
            hash_algorithm = "perceptual-image"
            ttl_seconds = 60
            "#,
        )
        .unwrap();

        assert_eq!(*policy.max_size(), DEFAULT_MAX_SIZE);
        assert_eq!(policy.ttl(), Some(Duration::from_secs(60)));
        assert_eq!(policy.storage_template(), "{class}/{blob_id}.{extension}");
        assert_eq!(policy.link_template(), "{class}s/{name}");
    }
}
