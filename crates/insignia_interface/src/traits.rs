//! Port traits.

use crate::{BlobClaim, LinkBinding, LinkCursor, Unbound};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use insignia_core::{BlobId, BlobRecord, LinkRecord, Placeholder, TemplateKey, TemplateRecord};
use insignia_error::InsigniaResult;
use std::path::Path;
use std::time::Duration;

/// Transactional registry of blobs and the links that reference them.
///
/// Implementations are the authority for the store's invariants. The
/// filesystem follows whatever they commit.
///
/// - at most one blob row per `(media_class, digest)`
/// - every link references a stored blob
/// - a blob row is only released while no link references it
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    /// Claim `(media_class, digest)` for `candidate`, or observe the existing row.
    ///
    /// Inserts `candidate` as a pending row unless one exists. A pending row
    /// older than `stale_after` is taken over: it is rewritten with the
    /// candidate's id, location and creation time and reported as `Claimed`.
    async fn claim_blob(
        &self,
        candidate: BlobRecord,
        stale_after: Duration,
    ) -> InsigniaResult<BlobClaim>;

    /// Mark a claimed blob as stored.
    ///
    /// Fails with `BlobNotFound` if the claim no longer exists (abandoned or
    /// taken over).
    async fn confirm_blob(&self, id: &BlobId) -> InsigniaResult<BlobRecord>;

    /// Drop a pending claim. No-op if the claim is gone.
    async fn abandon_blob(&self, id: &BlobId) -> InsigniaResult<()>;

    /// Look up a stored blob. Pending rows are not visible.
    async fn find_blob(&self, id: &BlobId) -> InsigniaResult<Option<BlobRecord>>;

    /// Delete a stored blob row if, re-counted under lock, no link references it.
    ///
    /// Returns the deleted row, or `None` when the blob is still referenced or
    /// already gone.
    async fn release_blob(&self, id: &BlobId) -> InsigniaResult<Option<BlobRecord>>;

    /// Bind a link name to a stored blob.
    ///
    /// Binding a name already bound to the same blob succeeds with
    /// `AlreadyBound`. Binding it to a different blob fails with
    /// `LinkAlreadyExists`. Fails with `BlobReleased` when the blob is not
    /// (or no longer) stored.
    async fn bind_link(&self, link: LinkRecord) -> InsigniaResult<LinkBinding>;

    /// Look up a link.
    async fn find_link(&self, media_class: &str, name: &str) -> InsigniaResult<Option<LinkRecord>>;

    /// Remove a link and count the links left on its blob, atomically.
    ///
    /// Returns `None` if the link does not exist.
    async fn unbind_link(&self, media_class: &str, name: &str) -> InsigniaResult<Option<Unbound>>;

    /// Number of links referencing a blob.
    async fn count_links(&self, id: &BlobId) -> InsigniaResult<u64>;

    /// One page of links with `expires_at < now`, ordered by
    /// `(expires_at, media_class, name)` and starting strictly after `after`.
    async fn expired_links(
        &self,
        now: DateTime<Utc>,
        after: Option<LinkCursor>,
        limit: usize,
    ) -> InsigniaResult<Vec<LinkRecord>>;

    /// One page of stored blobs that no link references and that were
    /// created before `created_before`, ordered by id and starting strictly
    /// after `after`.
    async fn unreferenced_blobs(
        &self,
        created_before: DateTime<Utc>,
        after: Option<BlobId>,
        limit: usize,
    ) -> InsigniaResult<Vec<BlobRecord>>;
}

/// Persistence for template metadata.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Insert or replace a template, returning the replaced record.
    async fn save(&self, record: TemplateRecord) -> InsigniaResult<Option<TemplateRecord>>;

    /// Look up a template.
    async fn find(&self, key: &TemplateKey) -> InsigniaResult<Option<TemplateRecord>>;

    /// Replace the placeholders of an existing template.
    ///
    /// Returns `None` if there is no template for `key`.
    async fn update_placeholders(
        &self,
        key: &TemplateKey,
        placeholders: Vec<Placeholder>,
        updated_at: DateTime<Utc>,
    ) -> InsigniaResult<Option<TemplateRecord>>;

    /// Delete a template, returning the removed record.
    async fn remove(&self, key: &TemplateKey) -> InsigniaResult<Option<TemplateRecord>>;
}

/// Composes a template background with its placeholders.
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    /// Render to PNG bytes.
    async fn render(&self, background: &Path, placeholders: &[Placeholder]) -> InsigniaResult<Vec<u8>>;
}
