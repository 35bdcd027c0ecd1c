//! Content store: one physical copy per unique content per class.

use crate::{bounded, BlobFiles, IoLimits};
use chrono::{DateTime, Utc};
use futures_util::Stream;
use insignia_core::{BlobId, BlobRecord, ContentDigest, ContentType, MediaPolicy};
use insignia_error::{
    CoordinationError, CoordinationErrorKind, InsigniaResult, NotFoundError, NotFoundErrorKind,
    StorageError, StorageErrorKind,
};
use insignia_interface::{BlobClaim, MediaCatalog};
use std::path::PathBuf;
use std::sync::Arc;

const UNREFERENCED_PAGE_SIZE: usize = 256;

/// Result of [`ContentStore::put`].
#[derive(Debug, Clone, PartialEq, Eq, derive_getters::Getters)]
pub struct StoredBlob {
    /// The stored blob
    record: BlobRecord,
    /// Whether this call wrote the bytes (false on a dedup hit)
    written: bool,
}

/// Blob persistence over a catalog and a blob file area.
///
/// Deduplication is decided by the catalog: the first caller to claim a
/// `(class, digest)` pair is its only writer, every later caller observes the
/// stored row and writes nothing.
#[derive(Clone)]
pub struct ContentStore {
    catalog: Arc<dyn MediaCatalog>,
    files: BlobFiles,
    limits: IoLimits,
}

impl std::fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStore")
            .field("files", &self.files)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl ContentStore {
    /// Create a content store.
    pub fn new(catalog: Arc<dyn MediaCatalog>, files: BlobFiles, limits: IoLimits) -> Self {
        Self {
            catalog,
            files,
            limits,
        }
    }

    /// The blob file area.
    pub fn files(&self) -> &BlobFiles {
        &self.files
    }

    /// Absolute path of a blob's bytes.
    pub fn path_of(&self, record: &BlobRecord) -> InsigniaResult<PathBuf> {
        self.files.path_of(record.location())
    }

    /// Store content, or return the existing blob with the same digest.
    ///
    /// # Errors
    ///
    /// - `ClaimInFlight` while another writer holds a fresh claim on the same
    ///   content (retryable)
    /// - storage errors from writing the bytes; the claim is abandoned and any
    ///   partial file removed before the error is returned
    /// - `Timeout` when a catalog or filesystem call exceeds its deadline
    #[tracing::instrument(
        skip(self, policy, content_type, bytes),
        fields(media_class = %policy.media_class(), digest = %digest, size = bytes.len())
    )]
    pub async fn put(
        &self,
        policy: &MediaPolicy,
        digest: &ContentDigest,
        content_type: &ContentType,
        bytes: &[u8],
    ) -> InsigniaResult<StoredBlob> {
        let id = BlobId::new();
        let candidate = BlobRecord::pending(
            id,
            policy.media_class().clone(),
            digest.clone(),
            policy.storage_path(&id, content_type.extension()),
            bytes.len() as u64,
            Utc::now(),
        );

        let claim = bounded(
            "claim_blob",
            *self.limits.timeout(),
            self.catalog.claim_blob(candidate, *self.limits.claim_stale_after()),
        )
        .await?;

        match claim {
            BlobClaim::Stored(record) => {
                tracing::debug!(blob_id = %record.id(), "Content already stored");
                Ok(StoredBlob {
                    record,
                    written: false,
                })
            }
            BlobClaim::InFlight(record) => {
                tracing::debug!(blob_id = %record.id(), "Content claimed by another writer");
                Err(CoordinationError::new(CoordinationErrorKind::ClaimInFlight {
                    media_class: record.media_class().clone(),
                    digest: record.digest().to_string(),
                })
                .into())
            }
            BlobClaim::Claimed(record) => {
                let record = self.write_claimed(record, bytes).await?;
                tracing::info!(
                    blob_id = %record.id(),
                    location = %record.location().display(),
                    size = bytes.len(),
                    "Stored blob"
                );
                Ok(StoredBlob {
                    record,
                    written: true,
                })
            }
        }
    }

    async fn write_claimed(&self, record: BlobRecord, bytes: &[u8]) -> InsigniaResult<BlobRecord> {
        let timeout = *self.limits.timeout();

        if let Err(e) = bounded("write_blob", timeout, self.files.write(record.location(), bytes)).await {
            self.roll_back(&record).await;
            return Err(e);
        }

        match bounded("confirm_blob", timeout, self.catalog.confirm_blob(record.id())).await {
            Ok(stored) => Ok(stored),
            Err(e) => {
                self.roll_back(&record).await;
                Err(e)
            }
        }
    }

    /// Undo a failed claim. Best effort: a leftover pending row is taken over
    /// once stale, a leftover file is overwritten by the next writer.
    async fn roll_back(&self, record: &BlobRecord) {
        let timeout = *self.limits.timeout();

        if let Err(e) = bounded("abandon_blob", timeout, self.catalog.abandon_blob(record.id())).await {
            tracing::warn!(blob_id = %record.id(), error = %e, "Failed to abandon blob claim");
        }
        if let Err(e) = bounded("remove_blob", timeout, self.files.remove(record.location())).await {
            tracing::warn!(blob_id = %record.id(), error = %e, "Failed to remove partial blob");
        }
    }

    /// Look up a stored blob.
    pub async fn find(&self, blob_id: &BlobId) -> InsigniaResult<Option<BlobRecord>> {
        bounded("find_blob", *self.limits.timeout(), self.catalog.find_blob(blob_id)).await
    }

    /// Read a stored blob's bytes.
    ///
    /// # Errors
    ///
    /// `BlobNotFound` when the blob is unregistered, still pending, or
    /// registered without bytes on disk. The last case is a storage
    /// inconsistency and is logged as such.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, blob_id: &BlobId) -> InsigniaResult<Vec<u8>> {
        let record = self
            .find(blob_id)
            .await?
            .ok_or_else(|| NotFoundError::new(NotFoundErrorKind::Blob(blob_id.to_string())))?;

        let timeout = *self.limits.timeout();
        match bounded("read_blob", timeout, self.files.read(record.location())).await? {
            Some(bytes) => Ok(bytes),
            None => {
                let inconsistency = StorageError::new(StorageErrorKind::Inconsistency(format!(
                    "blob {} registered at {} has no bytes",
                    blob_id,
                    record.location().display()
                )));
                tracing::warn!(error = %inconsistency, "Storage inconsistency");
                Err(NotFoundError::new(NotFoundErrorKind::Blob(blob_id.to_string())).into())
            }
        }
    }

    /// Delete a blob if nothing references it.
    ///
    /// Does nothing unless `reference_count` is zero. The catalog re-counts
    /// under lock before removing the row, so a link bound concurrently keeps
    /// the blob alive. The file is removed after the row; a missing file is
    /// fine. Returns whether the blob was deleted.
    #[tracing::instrument(skip(self))]
    pub async fn delete_if_unreferenced(
        &self,
        blob_id: &BlobId,
        reference_count: u64,
    ) -> InsigniaResult<bool> {
        if reference_count > 0 {
            return Ok(false);
        }

        let timeout = *self.limits.timeout();
        let Some(record) = bounded("release_blob", timeout, self.catalog.release_blob(blob_id)).await? else {
            tracing::debug!("Blob still referenced or already released");
            return Ok(false);
        };

        let removed = bounded("remove_blob", timeout, self.files.remove(record.location())).await?;
        if !removed {
            tracing::debug!(location = %record.location().display(), "Blob file already gone");
        }
        tracing::info!(blob_id = %blob_id, media_class = %record.media_class(), "Deleted blob");
        Ok(true)
    }

    /// Stored blobs that no link references.
    ///
    /// Blobs younger than the claim staleness age are skipped, since a
    /// writer may still be about to link them. Keyset-paginated by id, so
    /// releasing yielded blobs while consuming the stream is safe.
    pub fn unreferenced(&self, now: DateTime<Utc>) -> impl Stream<Item = InsigniaResult<BlobRecord>> + Send + '_ {
        let grace = chrono::Duration::from_std(*self.limits.claim_stale_after()).ok();
        let created_before = grace.and_then(|grace| now.checked_sub_signed(grace));

        async_stream::try_stream! {
            if let Some(created_before) = created_before {
                let mut cursor: Option<BlobId> = None;
                loop {
                    let page = bounded(
                        "unreferenced_blobs",
                        *self.limits.timeout(),
                        self.catalog.unreferenced_blobs(created_before, cursor, UNREFERENCED_PAGE_SIZE),
                    )
                    .await?;

                    let last_page = page.len() < UNREFERENCED_PAGE_SIZE;
                    cursor = page.last().map(|blob| *blob.id());
                    for blob in page {
                        yield blob;
                    }
                    if last_page || cursor.is_none() {
                        break;
                    }
                }
            }
        }
    }
}
