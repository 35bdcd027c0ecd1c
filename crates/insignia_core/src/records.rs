//! Blob and link records.

use crate::{BlobId, ContentDigest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Lifecycle state of a blob row.
///
/// A blob is `Pending` while its bytes are being written by the claimant and
/// becomes `Stored` once the write is confirmed. Pending blobs are never
/// returned by lookups and never satisfy deduplication.
///
/// # Examples
///
/// ```
/// use insignia_core::BlobState;
///
/// assert_eq!(BlobState::Pending.to_string(), "pending");
/// assert_eq!("stored".parse::<BlobState>().unwrap(), BlobState::Stored);
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum BlobState {
    /// Claimed, bytes not yet confirmed on disk
    #[display("pending")]
    Pending,
    /// Bytes durably written and visible
    #[display("stored")]
    Stored,
}

impl FromStr for BlobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "stored" => Ok(Self::Stored),
            other => Err(format!("unknown blob state: {other}")),
        }
    }
}

/// Metadata for one physically stored piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
pub struct BlobRecord {
    /// Stable identifier
    id: BlobId,
    /// Media class the blob belongs to
    media_class: String,
    /// Deduplication key within the class
    digest: ContentDigest,
    /// Location relative to the blob root
    location: PathBuf,
    /// Size of the stored bytes
    size_bytes: u64,
    /// Lifecycle state
    state: BlobState,
    /// When the blob row was claimed
    created_at: DateTime<Utc>,
}

impl BlobRecord {
    /// A fresh pending record.
    pub fn pending(
        id: BlobId,
        media_class: impl Into<String>,
        digest: ContentDigest,
        location: impl Into<PathBuf>,
        size_bytes: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            media_class: media_class.into(),
            digest,
            location: location.into(),
            size_bytes,
            state: BlobState::Pending,
            created_at,
        }
    }

    /// Rebuild a record from persisted fields.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: BlobId,
        media_class: String,
        digest: ContentDigest,
        location: PathBuf,
        size_bytes: u64,
        state: BlobState,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            media_class,
            digest,
            location,
            size_bytes,
            state,
            created_at,
        }
    }

    /// Same record, marked stored.
    pub fn into_stored(self) -> Self {
        Self {
            state: BlobState::Stored,
            ..self
        }
    }

    /// True once the bytes are confirmed.
    pub fn is_stored(&self) -> bool {
        self.state == BlobState::Stored
    }
}

/// A named reference from the link namespace of a media class to a blob.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, Utc};
/// use insignia_core::{BlobId, LinkRecord};
///
/// let now = Utc::now();
/// let link = LinkRecord::new("team-logo", "alpha.png", BlobId::new(), Some(now), now);
///
/// // Expiry is strict: a link is not expired at its own deadline.
/// assert!(!link.is_expired(now));
/// assert!(link.is_expired(now + Duration::seconds(1)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
pub struct LinkRecord {
    /// Namespace the name lives in
    media_class: String,
    /// Caller-chosen name, unique within the class
    name: String,
    /// Referenced blob
    blob_id: BlobId,
    /// Optional deadline after which the sweeper removes the link
    expires_at: Option<DateTime<Utc>>,
    /// When the link was created
    created_at: DateTime<Utc>,
}

impl LinkRecord {
    /// Create a link record.
    pub fn new(
        media_class: impl Into<String>,
        name: impl Into<String>,
        blob_id: BlobId,
        expires_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            media_class: media_class.into(),
            name: name.into(),
            blob_id,
            expires_at,
            created_at,
        }
    }

    /// Whether the link's deadline lies strictly before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| deadline < now)
    }

    /// `(class, name)` identity of the link.
    pub fn key(&self) -> (&str, &str) {
        (&self.media_class, &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn links_without_deadline_never_expire() {
        let link = LinkRecord::new("font", "Inter.ttf", BlobId::new(), None, Utc::now());
        assert!(!link.is_expired(Utc::now() + Duration::days(365 * 100)));
    }

    #[test]
    fn stored_transition_keeps_identity() {
        let id = BlobId::new();
        let pending = BlobRecord::pending(
            id,
            "font",
            ContentDigest::new("ab"),
            "font/x.ttf",
            2,
            Utc::now(),
        );
        assert!(!pending.is_stored());

        let stored = pending.clone().into_stored();
        assert!(stored.is_stored());
        assert_eq!(stored.id(), pending.id());
        assert_eq!(stored.digest(), pending.digest());
    }

    #[test]
    fn blob_state_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&BlobState::Stored).unwrap(), "\"stored\"");
        assert!("gone".parse::<BlobState>().is_err());
    }
}
