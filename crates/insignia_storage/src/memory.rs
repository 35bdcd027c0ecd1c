//! In-memory implementations of the catalog and template ports.
//!
//! All catalog tables sit behind one mutex, so every trait method is a single
//! serializable unit. That gives the same guarantees the PostgreSQL adapter
//! gets from its unique index and row locks. Useful for tests and for
//! embedding the store without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use insignia_core::{
    BlobId, BlobRecord, ContentDigest, LinkRecord, Placeholder, TemplateKey, TemplateRecord,
};
use insignia_error::{
    CoordinationError, CoordinationErrorKind, InsigniaResult, NotFoundError, NotFoundErrorKind,
    ValidationError, ValidationErrorKind,
};
use insignia_interface::{
    BlobClaim, LinkBinding, LinkCursor, MediaCatalog, TemplateRepository, Unbound,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Default)]
struct CatalogTables {
    blobs: HashMap<BlobId, BlobRecord>,
    by_digest: HashMap<(String, ContentDigest), BlobId>,
    links: BTreeMap<(String, String), LinkRecord>,
}

impl CatalogTables {
    fn count_links(&self, id: &BlobId) -> u64 {
        self.links.values().filter(|l| l.blob_id() == id).count() as u64
    }

    fn remove_blob(&mut self, id: &BlobId) -> Option<BlobRecord> {
        let record = self.blobs.remove(id)?;
        self.by_digest
            .remove(&(record.media_class().clone(), record.digest().clone()));
        Some(record)
    }
}

/// In-memory [`MediaCatalog`].
///
/// # Example
///
/// ```
/// use insignia_storage::InMemoryMediaCatalog;
///
/// # #[tokio::main]
/// # async fn main() {
/// let catalog = InMemoryMediaCatalog::new();
/// assert_eq!(catalog.blob_count().await, 0);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryMediaCatalog {
    tables: Arc<Mutex<CatalogTables>>,
}

impl InMemoryMediaCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blob rows, pending included (for testing).
    pub async fn blob_count(&self) -> usize {
        self.tables.lock().await.blobs.len()
    }

    /// Number of link rows (for testing).
    pub async fn link_count(&self) -> usize {
        self.tables.lock().await.links.len()
    }
}

fn is_stale(created_at: DateTime<Utc>, now: DateTime<Utc>, stale_after: Duration) -> bool {
    (now - created_at)
        .to_std()
        .map(|age| age >= stale_after)
        .unwrap_or(false)
}

#[async_trait]
impl MediaCatalog for InMemoryMediaCatalog {
    async fn claim_blob(
        &self,
        candidate: BlobRecord,
        stale_after: Duration,
    ) -> InsigniaResult<BlobClaim> {
        let mut tables = self.tables.lock().await;
        let key = (
            candidate.media_class().clone(),
            candidate.digest().clone(),
        );

        let existing = tables
            .by_digest
            .get(&key)
            .and_then(|id| tables.blobs.get(id))
            .cloned();
        if let Some(existing) = existing {
            if existing.is_stored() {
                return Ok(BlobClaim::Stored(existing));
            }
            if !is_stale(*existing.created_at(), *candidate.created_at(), stale_after) {
                return Ok(BlobClaim::InFlight(existing));
            }
            tracing::warn!(
                stale_id = %existing.id(),
                media_class = %existing.media_class(),
                "Taking over stale blob claim"
            );
            tables.remove_blob(existing.id());
        }

        tables.by_digest.insert(key, *candidate.id());
        tables.blobs.insert(*candidate.id(), candidate.clone());
        Ok(BlobClaim::Claimed(candidate))
    }

    async fn confirm_blob(&self, id: &BlobId) -> InsigniaResult<BlobRecord> {
        let mut tables = self.tables.lock().await;
        let record = tables
            .blobs
            .get_mut(id)
            .ok_or_else(|| NotFoundError::new(NotFoundErrorKind::Blob(id.to_string())))?;
        *record = record.clone().into_stored();
        Ok(record.clone())
    }

    async fn abandon_blob(&self, id: &BlobId) -> InsigniaResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.blobs.get(id).is_some_and(|r| !r.is_stored()) {
            tables.remove_blob(id);
        }
        Ok(())
    }

    async fn find_blob(&self, id: &BlobId) -> InsigniaResult<Option<BlobRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables.blobs.get(id).filter(|r| r.is_stored()).cloned())
    }

    async fn release_blob(&self, id: &BlobId) -> InsigniaResult<Option<BlobRecord>> {
        let mut tables = self.tables.lock().await;
        let releasable = tables.blobs.get(id).is_some_and(|r| r.is_stored())
            && tables.count_links(id) == 0;
        Ok(if releasable { tables.remove_blob(id) } else { None })
    }

    async fn bind_link(&self, link: LinkRecord) -> InsigniaResult<LinkBinding> {
        let mut tables = self.tables.lock().await;

        if !tables.blobs.get(link.blob_id()).is_some_and(|r| r.is_stored()) {
            return Err(CoordinationError::new(CoordinationErrorKind::BlobReleased(
                link.blob_id().to_string(),
            ))
            .into());
        }

        let key = (link.media_class().clone(), link.name().clone());
        match tables.links.get(&key) {
            Some(existing) if existing.blob_id() == link.blob_id() => {
                Ok(LinkBinding::AlreadyBound(existing.clone()))
            }
            Some(_) => Err(ValidationError::new(ValidationErrorKind::LinkAlreadyExists {
                media_class: key.0,
                name: key.1,
            })
            .into()),
            None => {
                tables.links.insert(key, link.clone());
                Ok(LinkBinding::Created(link))
            }
        }
    }

    async fn find_link(&self, media_class: &str, name: &str) -> InsigniaResult<Option<LinkRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .links
            .get(&(media_class.to_string(), name.to_string()))
            .cloned())
    }

    async fn unbind_link(&self, media_class: &str, name: &str) -> InsigniaResult<Option<Unbound>> {
        let mut tables = self.tables.lock().await;
        let Some(link) = tables
            .links
            .remove(&(media_class.to_string(), name.to_string()))
        else {
            return Ok(None);
        };
        let remaining = tables.count_links(link.blob_id());
        Ok(Some(Unbound::new(link, remaining)))
    }

    async fn count_links(&self, id: &BlobId) -> InsigniaResult<u64> {
        Ok(self.tables.lock().await.count_links(id))
    }

    async fn expired_links(
        &self,
        now: DateTime<Utc>,
        after: Option<LinkCursor>,
        limit: usize,
    ) -> InsigniaResult<Vec<LinkRecord>> {
        let tables = self.tables.lock().await;
        let mut expired: Vec<_> = tables
            .links
            .values()
            .filter(|l| l.is_expired(now))
            .filter(|l| after.as_ref().is_none_or(|cursor| cursor.precedes(l)))
            .cloned()
            .collect();
        expired.sort_by_key(LinkCursor::after);
        expired.truncate(limit);
        Ok(expired)
    }

    async fn unreferenced_blobs(
        &self,
        created_before: DateTime<Utc>,
        after: Option<BlobId>,
        limit: usize,
    ) -> InsigniaResult<Vec<BlobRecord>> {
        let tables = self.tables.lock().await;
        let mut unreferenced: Vec<_> = tables
            .blobs
            .values()
            .filter(|b| b.is_stored() && *b.created_at() < created_before)
            .filter(|b| after.is_none_or(|after| *b.id() > after))
            .filter(|b| tables.count_links(b.id()) == 0)
            .cloned()
            .collect();
        unreferenced.sort_by_key(|b| *b.id());
        unreferenced.truncate(limit);
        Ok(unreferenced)
    }
}

/// In-memory [`TemplateRepository`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryTemplateRepository {
    templates: Arc<RwLock<HashMap<TemplateKey, TemplateRecord>>>,
}

impl InMemoryTemplateRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored templates (for testing).
    pub async fn len(&self) -> usize {
        self.templates.read().await.len()
    }

    /// Check if the repository is empty (for testing).
    pub async fn is_empty(&self) -> bool {
        self.templates.read().await.is_empty()
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    async fn save(&self, record: TemplateRecord) -> InsigniaResult<Option<TemplateRecord>> {
        Ok(self
            .templates
            .write()
            .await
            .insert(record.key().clone(), record))
    }

    async fn find(&self, key: &TemplateKey) -> InsigniaResult<Option<TemplateRecord>> {
        Ok(self.templates.read().await.get(key).cloned())
    }

    async fn update_placeholders(
        &self,
        key: &TemplateKey,
        placeholders: Vec<Placeholder>,
        updated_at: DateTime<Utc>,
    ) -> InsigniaResult<Option<TemplateRecord>> {
        let mut templates = self.templates.write().await;
        let Some(existing) = templates.remove(key) else {
            return Ok(None);
        };
        let updated = existing.with_placeholders(placeholders, updated_at);
        templates.insert(key.clone(), updated.clone());
        Ok(Some(updated))
    }

    async fn remove(&self, key: &TemplateKey) -> InsigniaResult<Option<TemplateRecord>> {
        Ok(self.templates.write().await.remove(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn pending(class: &str, digest: &str) -> BlobRecord {
        let id = BlobId::new();
        BlobRecord::pending(
            id,
            class,
            ContentDigest::new(digest),
            PathBuf::from(format!("{class}/{id}.png")),
            3,
            Utc::now(),
        )
    }

    const FRESH: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn second_claim_sees_in_flight_then_stored() {
        let catalog = InMemoryMediaCatalog::new();
        let first = pending("team-logo", "aa");
        let BlobClaim::Claimed(claimed) = catalog.claim_blob(first.clone(), FRESH).await.unwrap() else {
            panic!("first claim should win");
        };

        let second = catalog.claim_blob(pending("team-logo", "aa"), FRESH).await.unwrap();
        assert!(matches!(second, BlobClaim::InFlight(ref r) if r.id() == claimed.id()));
        assert!(catalog.find_blob(claimed.id()).await.unwrap().is_none());

        catalog.confirm_blob(claimed.id()).await.unwrap();
        let third = catalog.claim_blob(pending("team-logo", "aa"), FRESH).await.unwrap();
        assert!(matches!(third, BlobClaim::Stored(ref r) if r.id() == claimed.id()));
        assert_eq!(catalog.blob_count().await, 1);
    }

    #[tokio::test]
    async fn same_digest_in_other_class_is_independent() {
        let catalog = InMemoryMediaCatalog::new();
        catalog.claim_blob(pending("team-logo", "aa"), FRESH).await.unwrap();
        let other = catalog.claim_blob(pending("clan-badge", "aa"), FRESH).await.unwrap();
        assert!(matches!(other, BlobClaim::Claimed(_)));
    }

    #[tokio::test]
    async fn stale_claim_is_taken_over() {
        let catalog = InMemoryMediaCatalog::new();
        let crashed = pending("font", "bb");
        catalog.claim_blob(crashed.clone(), FRESH).await.unwrap();

        let takeover = pending("font", "bb");
        let claim = catalog.claim_blob(takeover.clone(), Duration::ZERO).await.unwrap();
        assert!(matches!(claim, BlobClaim::Claimed(ref r) if r.id() == takeover.id()));

        // The crashed writer can no longer confirm.
        assert!(catalog.confirm_blob(crashed.id()).await.unwrap_err().is_not_found());
        assert_eq!(catalog.blob_count().await, 1);
    }

    #[tokio::test]
    async fn abandon_removes_only_pending_rows() {
        let catalog = InMemoryMediaCatalog::new();
        let blob = pending("font", "cc");
        catalog.claim_blob(blob.clone(), FRESH).await.unwrap();
        catalog.abandon_blob(blob.id()).await.unwrap();
        assert_eq!(catalog.blob_count().await, 0);

        catalog.claim_blob(blob.clone(), FRESH).await.unwrap();
        catalog.confirm_blob(blob.id()).await.unwrap();
        catalog.abandon_blob(blob.id()).await.unwrap();
        assert_eq!(catalog.blob_count().await, 1);
    }

    #[tokio::test]
    async fn bind_rejects_pending_blob_and_conflicting_name() {
        let catalog = InMemoryMediaCatalog::new();
        let a = pending("team-logo", "a1");
        let b = pending("team-logo", "b1");
        catalog.claim_blob(a.clone(), FRESH).await.unwrap();
        catalog.claim_blob(b.clone(), FRESH).await.unwrap();

        let link = |blob: &BlobRecord| LinkRecord::new("team-logo", "alpha.png", *blob.id(), None, Utc::now());
        assert!(catalog.bind_link(link(&a)).await.is_err());

        catalog.confirm_blob(a.id()).await.unwrap();
        catalog.confirm_blob(b.id()).await.unwrap();
        assert!(matches!(catalog.bind_link(link(&a)).await.unwrap(), LinkBinding::Created(_)));
        assert!(matches!(catalog.bind_link(link(&a)).await.unwrap(), LinkBinding::AlreadyBound(_)));

        let err = catalog.bind_link(link(&b)).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn release_waits_for_last_link() {
        let catalog = InMemoryMediaCatalog::new();
        let blob = pending("team-logo", "dd");
        catalog.claim_blob(blob.clone(), FRESH).await.unwrap();
        catalog.confirm_blob(blob.id()).await.unwrap();
        for name in ["a.png", "b.png"] {
            catalog
                .bind_link(LinkRecord::new("team-logo", name, *blob.id(), None, Utc::now()))
                .await
                .unwrap();
        }

        let unbound = catalog.unbind_link("team-logo", "a.png").await.unwrap().unwrap();
        assert_eq!(*unbound.remaining(), 1);
        assert!(catalog.release_blob(blob.id()).await.unwrap().is_none());

        let unbound = catalog.unbind_link("team-logo", "b.png").await.unwrap().unwrap();
        assert!(unbound.was_last_reference());
        assert!(catalog.release_blob(blob.id()).await.unwrap().is_some());
        assert!(catalog.unbind_link("team-logo", "b.png").await.unwrap().is_none());
    }
}
