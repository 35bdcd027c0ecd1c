//! Value types returned by the catalog port.

use chrono::{DateTime, Utc};
use insignia_core::{BlobRecord, LinkRecord};
use serde::{Deserialize, Serialize};

/// Outcome of claiming a `(media class, digest)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobClaim {
    /// The caller owns the pending row and must write the bytes, then confirm
    /// or abandon.
    Claimed(BlobRecord),
    /// Identical content is already stored; nothing to write.
    Stored(BlobRecord),
    /// Another writer holds a fresh pending claim.
    InFlight(BlobRecord),
}

impl BlobClaim {
    /// The record the claim refers to.
    pub fn record(&self) -> &BlobRecord {
        match self {
            Self::Claimed(r) | Self::Stored(r) | Self::InFlight(r) => r,
        }
    }
}

/// Outcome of binding a link name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkBinding {
    /// A new link row was inserted.
    Created(LinkRecord),
    /// The name was already bound to the same blob; the existing row is returned.
    AlreadyBound(LinkRecord),
}

impl LinkBinding {
    /// The bound link.
    pub fn link(&self) -> &LinkRecord {
        match self {
            Self::Created(l) | Self::AlreadyBound(l) => l,
        }
    }

    /// Consume into the bound link.
    pub fn into_link(self) -> LinkRecord {
        match self {
            Self::Created(l) | Self::AlreadyBound(l) => l,
        }
    }
}

/// A removed link and the number of links still referencing its blob,
/// counted in the same transactional unit as the removal.
#[derive(Debug, Clone, PartialEq, Eq, derive_getters::Getters)]
pub struct Unbound {
    /// The removed link
    link: LinkRecord,
    /// Links still pointing at the blob
    remaining: u64,
}

impl Unbound {
    /// Create an unbind result.
    pub fn new(link: LinkRecord, remaining: u64) -> Self {
        Self { link, remaining }
    }

    /// True when the removed link was the last reference.
    pub fn was_last_reference(&self) -> bool {
        self.remaining == 0
    }
}

/// Keyset position in the `(expires_at, media_class, name)` ordering of
/// expired links.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkCursor {
    /// Expiry of the last link seen
    pub expires_at: DateTime<Utc>,
    /// Class of the last link seen
    pub media_class: String,
    /// Name of the last link seen
    pub name: String,
}

impl LinkCursor {
    /// Cursor positioned at a link; `None` for links that never expire.
    pub fn after(link: &LinkRecord) -> Option<Self> {
        (*link.expires_at()).map(|expires_at| Self {
            expires_at,
            media_class: link.media_class().clone(),
            name: link.name().clone(),
        })
    }

    /// Whether a link sorts strictly after this cursor.
    pub fn precedes(&self, link: &LinkRecord) -> bool {
        match LinkCursor::after(link) {
            Some(other) => *self < other,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use insignia_core::BlobId;

    #[test]
    fn cursor_orders_by_expiry_then_class_then_name() {
        let t = Utc::now();
        let link = |class: &str, name: &str, at| LinkRecord::new(class, name, BlobId::new(), Some(at), t);

        let cursor = LinkCursor::after(&link("team-logo", "b.png", t)).unwrap();
        assert!(!cursor.precedes(&link("team-logo", "b.png", t)));
        assert!(!cursor.precedes(&link("team-logo", "a.png", t)));
        assert!(cursor.precedes(&link("team-logo", "c.png", t)));
        assert!(cursor.precedes(&link("clan-badge", "a.png", t + Duration::seconds(1))));
        assert!(!cursor.precedes(&LinkRecord::new("font", "x.ttf", BlobId::new(), None, t)));
    }
}
