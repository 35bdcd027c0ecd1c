//! Link table: stable names over content-addressed blobs.

use crate::{bounded, BlobFiles, IoLimits, LinkNamespace};
use chrono::{DateTime, Utc};
use futures_util::Stream;
use insignia_core::{BlobId, BlobRecord, LinkRecord, MediaPolicy};
use insignia_error::{ConfigError, InsigniaResult, NotFoundError, NotFoundErrorKind};
use insignia_interface::{LinkBinding, LinkCursor, MediaCatalog, Unbound};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_PAGE_SIZE: usize = 256;

/// Name → blob bindings, backed by the catalog and mirrored into the link
/// namespace on disk.
#[derive(Clone)]
pub struct LinkTable {
    catalog: Arc<dyn MediaCatalog>,
    namespace: LinkNamespace,
    files: BlobFiles,
    limits: IoLimits,
    page_size: usize,
}

impl std::fmt::Debug for LinkTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkTable")
            .field("namespace", &self.namespace)
            .field("limits", &self.limits)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl LinkTable {
    /// Create a link table.
    ///
    /// `files` is the blob area link entries point into.
    pub fn new(
        catalog: Arc<dyn MediaCatalog>,
        namespace: LinkNamespace,
        files: BlobFiles,
        limits: IoLimits,
    ) -> Self {
        Self {
            catalog,
            namespace,
            files,
            limits,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set how many expired links are fetched per catalog round trip.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// The physical link namespace.
    pub fn namespace(&self) -> &LinkNamespace {
        &self.namespace
    }

    /// Bind `name` to `blob` in the policy's namespace.
    ///
    /// Binding a name to the blob it already points at is idempotent and
    /// returns the existing link unchanged. The on-disk entry is (re)installed
    /// after the catalog commits.
    ///
    /// # Errors
    ///
    /// - `LinkAlreadyExists` if `name` is bound to a different blob
    /// - `BlobReleased` if `blob` was released concurrently (retryable)
    #[tracing::instrument(skip(self, policy, blob), fields(media_class = %policy.media_class(), blob_id = %blob.id()))]
    pub async fn create(
        &self,
        policy: &MediaPolicy,
        name: &str,
        blob: &BlobRecord,
        ttl: Option<Duration>,
    ) -> InsigniaResult<LinkRecord> {
        let now = Utc::now();
        let expires_at = ttl.map(|ttl| expiry_after(now, ttl)).transpose()?;
        let link = LinkRecord::new(policy.media_class().clone(), name, *blob.id(), expires_at, now);

        let timeout = *self.limits.timeout();
        let binding = bounded("bind_link", timeout, self.catalog.bind_link(link)).await?;

        let target = self.files.path_of(blob.location())?;
        bounded("install_link", timeout, self.namespace.install(policy, name, &target)).await?;

        match binding {
            LinkBinding::Created(link) => {
                tracing::info!(expires_at = ?link.expires_at(), "Created link");
                Ok(link)
            }
            LinkBinding::AlreadyBound(link) => {
                tracing::debug!("Link already bound to this blob");
                Ok(link)
            }
        }
    }

    /// Look up a link.
    ///
    /// # Errors
    ///
    /// `LinkNotFound` if the name is not bound.
    pub async fn resolve(&self, media_class: &str, name: &str) -> InsigniaResult<LinkRecord> {
        bounded(
            "find_link",
            *self.limits.timeout(),
            self.catalog.find_link(media_class, name),
        )
        .await?
        .ok_or_else(|| link_not_found(media_class, name))
    }

    /// Remove a binding and report how many links still reference its blob.
    ///
    /// The count is taken in the same catalog unit as the removal. The
    /// on-disk entry is removed afterwards; an entry that is already gone, or
    /// that was rebound in the meantime, is left alone.
    ///
    /// # Errors
    ///
    /// `LinkNotFound` if the name is not bound.
    #[tracing::instrument(skip(self, policy), fields(media_class = %policy.media_class()))]
    pub async fn delete(&self, policy: &MediaPolicy, name: &str) -> InsigniaResult<Unbound> {
        let timeout = *self.limits.timeout();
        let unbound = bounded(
            "unbind_link",
            timeout,
            self.catalog.unbind_link(policy.media_class(), name),
        )
        .await?
        .ok_or_else(|| link_not_found(policy.media_class(), name))?;

        let blob = bounded(
            "find_blob",
            timeout,
            self.catalog.find_blob(unbound.link().blob_id()),
        )
        .await?;
        if let Some(blob) = blob {
            let target = self.files.path_of(blob.location())?;
            if let Err(e) = bounded("remove_link", timeout, self.namespace.remove(policy, name, &target)).await {
                tracing::warn!(error = %e, "Failed to remove link entry");
            }
        }

        tracing::info!(
            blob_id = %unbound.link().blob_id(),
            remaining = unbound.remaining(),
            "Deleted link"
        );
        Ok(unbound)
    }

    /// Number of links referencing a blob.
    pub async fn count_references(&self, blob_id: &BlobId) -> InsigniaResult<u64> {
        bounded("count_links", *self.limits.timeout(), self.catalog.count_links(blob_id)).await
    }

    /// Links whose expiry lies strictly before `now`.
    ///
    /// The stream is lazy and keyset-paginated over
    /// `(expires_at, media_class, name)`, so deleting yielded links while
    /// consuming it neither skips nor repeats entries. It ends after the last
    /// page. Re-running from a later `now` picks up anything an interrupted
    /// consumer missed.
    pub fn expired(&self, now: DateTime<Utc>) -> impl Stream<Item = InsigniaResult<LinkRecord>> + Send + '_ {
        async_stream::try_stream! {
            let mut cursor: Option<LinkCursor> = None;
            loop {
                let page = bounded(
                    "expired_links",
                    *self.limits.timeout(),
                    self.catalog.expired_links(now, cursor.clone(), self.page_size),
                )
                .await?;

                let last_page = page.len() < self.page_size;
                if let Some(last) = page.last() {
                    cursor = LinkCursor::after(last);
                }
                for link in page {
                    yield link;
                }
                if last_page || cursor.is_none() {
                    break;
                }
            }
        }
    }
}

fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> InsigniaResult<DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| {
            ConfigError::new(format!("link ttl of {}s is out of range", ttl.as_secs())).into()
        })
}

fn link_not_found(media_class: &str, name: &str) -> insignia_error::InsigniaError {
    NotFoundError::new(NotFoundErrorKind::Link {
        media_class: media_class.to_string(),
        name: name.to_string(),
    })
    .into()
}
