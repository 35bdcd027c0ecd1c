//! Identifier types.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a stored blob.
///
/// Allocated once, when novel content is first stored; stable for the
/// lifetime of the blob.
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
    derive_more::From,
)]
#[serde(transparent)]
pub struct BlobId(Uuid);

impl BlobId {
    /// Allocate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BlobId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for BlobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Deterministic content fingerprint, lowercase hex.
///
/// SHA-256 for exact-content classes, a 256-bit block-mean hash for
/// perceptual-image classes. Used as the deduplication key together with the
/// media class.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Wrap an already-computed hex digest.
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Hex representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of differing bits between two digests of equal length.
    ///
    /// Meaningful for perceptual digests, where near-duplicate images differ
    /// in a handful of bits. Returns `None` if the digests are not comparable.
    pub fn hamming_distance(&self, other: &ContentDigest) -> Option<u32> {
        if self.0.len() != other.0.len() {
            return None;
        }
        self.0
            .chars()
            .zip(other.0.chars())
            .map(|(a, b)| Some((a.to_digit(16)? ^ b.to_digit(16)?).count_ones()))
            .sum()
    }
}
