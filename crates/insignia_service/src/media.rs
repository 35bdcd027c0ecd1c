//! Store, retrieve and delete media by name.

use crate::RetryPolicy;
use insignia_core::{BlobId, BlobRecord, ContentDigest, ContentType, LinkRecord, MediaClassifier, MediaPolicy};
use insignia_error::{InsigniaResult, NotFoundError, NotFoundErrorKind, StorageError, StorageErrorKind};
use insignia_storage::{ContentStore, LinkTable};
use std::path::PathBuf;
use std::sync::Arc;

/// Who asked for a link to be removed.
///
/// Decides how a link that is already gone is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionContext {
    /// A caller named the link; a missing link is `LinkNotFound`.
    Explicit,
    /// The expiry sweeper (or another cleanup path); a missing link is a no-op.
    Sweep,
}

/// Result of running the deletion protocol for one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionOutcome {
    /// The link was removed.
    Deleted {
        /// The removed link
        link: LinkRecord,
        /// Whether the blob went with it (it was the last reference)
        blob_deleted: bool,
    },
    /// Nothing to do (sweep context only): the link was already removed, or
    /// was rebound after the sweeper found it.
    AlreadyGone,
}

impl DeletionOutcome {
    /// True if the blob was deleted.
    pub fn blob_deleted(&self) -> bool {
        matches!(self, Self::Deleted { blob_deleted: true, .. })
    }
}

/// Result of StoreMedia.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, derive_getters::Getters)]
pub struct StoredMedia {
    /// The link now naming the content
    link: LinkRecord,
    /// The blob holding the content
    blob: BlobRecord,
    /// True when identical content was already stored and nothing was written
    deduplicated: bool,
}

impl StoredMedia {
    /// Identifier of the stored content.
    pub fn blob_id(&self) -> &BlobId {
        self.blob.id()
    }

    /// Content digest (the deduplication key within the class).
    pub fn digest(&self) -> &ContentDigest {
        self.blob.digest()
    }
}

/// A submission that passed validation and hashing, ready to store.
#[derive(Debug, Clone)]
pub struct PreparedMedia {
    policy: MediaPolicy,
    content_type: ContentType,
    digest: ContentDigest,
    filename: String,
    bytes: Vec<u8>,
}

impl PreparedMedia {
    /// Media class the content will be stored in.
    pub fn media_class(&self) -> &str {
        self.policy.media_class()
    }

    /// Name the content will be linked under.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Content digest.
    pub fn digest(&self) -> &ContentDigest {
        &self.digest
    }
}

/// The exposed media operations.
///
/// Holds its collaborators explicitly so tests can run it over the
/// in-memory catalog and a temporary directory.
///
/// # Example
///
/// ```no_run
/// use insignia_core::{MediaClassifier, PolicyTable};
/// use insignia_service::{MediaService, RetryPolicy};
/// use insignia_storage::{BlobFiles, ContentStore, InMemoryMediaCatalog, IoLimits, LinkNamespace, LinkTable};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let catalog = Arc::new(InMemoryMediaCatalog::new());
/// let files = BlobFiles::new("/var/lib/insignia/blobs")?;
/// let links = LinkNamespace::new("/var/lib/insignia/links")?;
/// let limits = IoLimits::default();
///
/// let media = MediaService::new(
///     MediaClassifier::new(PolicyTable::builtin()),
///     ContentStore::new(catalog.clone(), files.clone(), limits.clone()),
///     LinkTable::new(catalog, links, files, limits),
///     RetryPolicy::default(),
/// );
///
/// let png = std::fs::read("alpha.png")?;
/// let stored = media.store_media(png, "team-logo", "alpha.png").await?;
/// println!("{} -> {}", stored.link().name(), stored.blob_id());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MediaService {
    classifier: Arc<MediaClassifier>,
    store: ContentStore,
    links: LinkTable,
    retry: RetryPolicy,
}

impl MediaService {
    /// Create the service.
    pub fn new(
        classifier: MediaClassifier,
        store: ContentStore,
        links: LinkTable,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            classifier: Arc::new(classifier),
            store,
            links,
            retry,
        }
    }

    /// The classifier and its policy table.
    pub fn classifier(&self) -> &MediaClassifier {
        &self.classifier
    }

    /// The content store.
    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    /// The link table.
    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    /// Check a submission without touching storage.
    ///
    /// # Errors
    ///
    /// `UnknownMediaClass`, `InvalidLinkName`, `ContentTooLarge` or
    /// `InvalidContentType`.
    pub fn validate(&self, bytes: &[u8], media_class: &str, filename: &str) -> InsigniaResult<(MediaPolicy, ContentType)> {
        let policy = self.classifier.resolve(media_class)?;
        self.classifier.validate_name(filename)?;
        let content_type = self.classifier.validate(bytes, policy)?;
        Ok((policy.clone(), content_type))
    }

    /// Validate and fingerprint a submission without touching storage.
    ///
    /// Hashing decodes the whole image, so content that only looks like an
    /// image (a truncated PNG, say) is rejected here rather than in
    /// [`validate`](Self::validate).
    ///
    /// # Errors
    ///
    /// Validation errors, including `InvalidContentType` for images that do
    /// not decode.
    pub async fn prepare(
        &self,
        bytes: Vec<u8>,
        media_class: &str,
        filename: &str,
    ) -> InsigniaResult<PreparedMedia> {
        let (policy, content_type) = self.validate(&bytes, media_class, filename)?;

        let classifier = Arc::clone(&self.classifier);
        let hashed_policy = policy.clone();
        let (digest, bytes) = tokio::task::spawn_blocking(move || {
            classifier.hash(&bytes, &hashed_policy).map(|digest| (digest, bytes))
        })
        .await
        .map_err(|e| StorageError::new(StorageErrorKind::Task(e.to_string())))??;

        Ok(PreparedMedia {
            policy,
            content_type,
            digest,
            filename: filename.to_string(),
            bytes,
        })
    }

    /// StoreMedia: store `bytes` in `media_class` and name them `filename`.
    ///
    /// Identical content already stored in the class is reused without a
    /// second write. Storing the same content under the same name again
    /// succeeds and returns the existing link. The link expires after the
    /// class's default time-to-live, if it has one.
    ///
    /// # Errors
    ///
    /// - validation errors (see [`prepare`](Self::prepare)), raised before
    ///   anything is stored
    /// - `LinkAlreadyExists` if `filename` names different content
    /// - `Exhausted` if a concurrent writer or release kept the content busy
    ///   for the whole retry budget
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn store_media(
        &self,
        bytes: Vec<u8>,
        media_class: &str,
        filename: &str,
    ) -> InsigniaResult<StoredMedia> {
        let prepared = self.prepare(bytes, media_class, filename).await?;
        self.store_prepared(&prepared).await
    }

    /// Store content that already passed [`prepare`](Self::prepare).
    ///
    /// If the name cannot be bound, a blob this call left without links is
    /// released again before the error is returned.
    ///
    /// # Errors
    ///
    /// As [`store_media`](Self::store_media), minus validation.
    #[tracing::instrument(skip_all, fields(media_class = %prepared.media_class(), name = %prepared.filename))]
    pub async fn store_prepared(&self, prepared: &PreparedMedia) -> InsigniaResult<StoredMedia> {
        let this = self;
        let (stored, link) = self
            .retry
            .run("store_media", move || async move {
                let policy = &prepared.policy;
                let stored = this
                    .store
                    .put(policy, &prepared.digest, &prepared.content_type, &prepared.bytes)
                    .await?;
                match this
                    .links
                    .create(policy, &prepared.filename, stored.record(), policy.ttl())
                    .await
                {
                    Ok(link) => Ok((stored, link)),
                    Err(e) => {
                        this.release_if_unlinked(stored.record().id()).await;
                        Err(e)
                    }
                }
            })
            .await?;

        let deduplicated = !*stored.written();
        tracing::info!(
            link = %link.name(),
            blob_id = %stored.record().id(),
            deduplicated,
            "Stored media"
        );
        Ok(StoredMedia {
            link,
            blob: stored.record().clone(),
            deduplicated,
        })
    }

    /// Release a blob nothing links to. Failures are logged; the sweeper's
    /// unreferenced-blob pass picks up whatever is left.
    async fn release_if_unlinked(&self, blob_id: &BlobId) {
        let released = match self.links.count_references(blob_id).await {
            Ok(count) => self.store.delete_if_unreferenced(blob_id, count).await,
            Err(e) => Err(e),
        };
        match released {
            Ok(true) => tracing::debug!(%blob_id, "Released blob left without links"),
            Ok(false) => {}
            Err(e) => tracing::warn!(%blob_id, error = %e, "Failed to release blob left without links"),
        }
    }

    /// RetrieveMedia: the bytes behind a link.
    ///
    /// # Errors
    ///
    /// `LinkNotFound`, or `BlobNotFound` when the bytes are gone.
    #[tracing::instrument(skip(self))]
    pub async fn retrieve_media(&self, media_class: &str, name: &str) -> InsigniaResult<Vec<u8>> {
        self.classifier.resolve(media_class)?;
        let this = self;
        self.retry
            .run("retrieve_media", move || async move {
                let link = this.links.resolve(media_class, name).await?;
                this.store.get(link.blob_id()).await
            })
            .await
    }

    /// DeleteMedia: remove a link by name, and its blob if that was the last
    /// reference.
    ///
    /// # Errors
    ///
    /// `LinkNotFound` if the name is not bound.
    pub async fn delete_media(&self, media_class: &str, name: &str) -> InsigniaResult<DeletionOutcome> {
        self.remove_link(media_class, name, DeletionContext::Explicit)
            .await
    }

    /// The deletion protocol.
    ///
    /// 1. unbind the link, counting the links left on its blob in the same
    ///    catalog unit
    /// 2. if none are left, release the blob (the catalog re-checks under
    ///    lock) and remove its bytes
    #[tracing::instrument(skip(self))]
    pub async fn remove_link(
        &self,
        media_class: &str,
        name: &str,
        context: DeletionContext,
    ) -> InsigniaResult<DeletionOutcome> {
        let policy = self.classifier.resolve(media_class)?;

        let this = self;
        let unbound = match self
            .retry
            .run("unbind_link", move || async move { this.links.delete(policy, name).await })
            .await
        {
            Ok(unbound) => unbound,
            Err(e) if e.is_link_not_found() && context == DeletionContext::Sweep => {
                tracing::debug!("Link already removed");
                return Ok(DeletionOutcome::AlreadyGone);
            }
            Err(e) => return Err(e),
        };

        let (blob_id, remaining) = (unbound.link().blob_id(), *unbound.remaining());
        let blob_deleted = self
            .retry
            .run("release_blob", move || async move {
                this.store.delete_if_unreferenced(blob_id, remaining).await
            })
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    %blob_id,
                    error = %e,
                    "Link removed but its blob was not released; the sweeper will reclaim it"
                );
            })?;

        Ok(DeletionOutcome::Deleted {
            link: unbound.link().clone(),
            blob_deleted,
        })
    }

    /// Absolute path of a stored blob's bytes.
    ///
    /// # Errors
    ///
    /// `BlobNotFound` if the blob is not stored.
    pub async fn blob_path(&self, blob_id: &BlobId) -> InsigniaResult<PathBuf> {
        let record = self
            .store
            .find(blob_id)
            .await?
            .ok_or_else(|| NotFoundError::new(NotFoundErrorKind::Blob(blob_id.to_string())))?;
        self.store.path_of(&record)
    }
}
