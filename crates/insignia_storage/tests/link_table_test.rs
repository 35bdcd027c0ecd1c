//! Tests for the link table and its on-disk namespace.

use chrono::{Duration as ChronoDuration, Utc};
use futures::TryStreamExt;
use insignia_core::{BlobRecord, ContentDigest, ContentType, LinkRecord, MediaPolicy, PolicyTable};
use insignia_interface::MediaCatalog;
use insignia_storage::{BlobFiles, ContentStore, InMemoryMediaCatalog, IoLimits, LinkNamespace, LinkTable};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    catalog: InMemoryMediaCatalog,
    store: ContentStore,
    links: LinkTable,
    policy: MediaPolicy,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let catalog = InMemoryMediaCatalog::new();
        let files = BlobFiles::new(dir.path().join("blobs")).unwrap();
        let namespace = LinkNamespace::new(dir.path().join("links")).unwrap();
        let shared: Arc<dyn MediaCatalog> = Arc::new(catalog.clone());
        let store = ContentStore::new(shared.clone(), files.clone(), IoLimits::default());
        let links = LinkTable::new(shared, namespace, files, IoLimits::default()).with_page_size(2);
        let policy = PolicyTable::builtin().resolve("team-logo").unwrap().clone();
        Self {
            dir,
            catalog,
            store,
            links,
            policy,
        }
    }

    async fn blob(&self, content: &[u8]) -> BlobRecord {
        let digest = ContentDigest::new(String::from_utf8_lossy(content).into_owned());
        self.store
            .put(&self.policy, &digest, &ContentType::new("image/png", "png"), content)
            .await
            .unwrap()
            .record()
            .clone()
    }

    fn entry(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join("links/team-logos").join(name)
    }
}

#[tokio::test]
async fn test_create_and_resolve() {
    let fx = Fixture::new();
    let blob = fx.blob(b"alpha").await;

    let link = fx.links.create(&fx.policy, "alpha.png", &blob, None).await.unwrap();
    assert_eq!(link.blob_id(), blob.id());
    assert!(link.expires_at().is_none());

    let resolved = fx.links.resolve("team-logo", "alpha.png").await.unwrap();
    assert_eq!(resolved, link);
    assert_eq!(std::fs::read(fx.entry("alpha.png")).unwrap(), b"alpha");
}

#[tokio::test]
async fn test_create_sets_expiry_from_ttl() {
    let fx = Fixture::new();
    let blob = fx.blob(b"alpha").await;
    let before = Utc::now();

    let link = fx
        .links
        .create(&fx.policy, "alpha.png", &blob, Some(Duration::from_secs(60)))
        .await
        .unwrap();

    let expires_at = link.expires_at().unwrap();
    assert!(expires_at >= before + ChronoDuration::seconds(60));
    assert!(expires_at <= Utc::now() + ChronoDuration::seconds(60));
}

#[tokio::test]
async fn test_rebinding_same_blob_is_idempotent() {
    let fx = Fixture::new();
    let blob = fx.blob(b"alpha").await;

    let first = fx.links.create(&fx.policy, "alpha.png", &blob, None).await.unwrap();
    let again = fx
        .links
        .create(&fx.policy, "alpha.png", &blob, Some(Duration::from_secs(5)))
        .await
        .unwrap();

    assert_eq!(first, again);
    assert_eq!(fx.catalog.link_count().await, 1);
}

#[tokio::test]
async fn test_rebinding_other_blob_is_rejected() {
    let fx = Fixture::new();
    let alpha = fx.blob(b"alpha").await;
    let beta = fx.blob(b"beta").await;

    fx.links.create(&fx.policy, "logo.png", &alpha, None).await.unwrap();
    let err = fx.links.create(&fx.policy, "logo.png", &beta, None).await.unwrap_err();

    assert!(err.is_validation());
    assert_eq!(std::fs::read(fx.entry("logo.png")).unwrap(), b"alpha");
}

#[tokio::test]
async fn test_delete_counts_remaining_references() {
    let fx = Fixture::new();
    let blob = fx.blob(b"alpha").await;
    fx.links.create(&fx.policy, "alpha.png", &blob, None).await.unwrap();
    fx.links.create(&fx.policy, "alpha-copy.png", &blob, None).await.unwrap();
    assert_eq!(fx.links.count_references(blob.id()).await.unwrap(), 2);

    let unbound = fx.links.delete(&fx.policy, "alpha.png").await.unwrap();
    assert_eq!(*unbound.remaining(), 1);
    assert!(!fx.entry("alpha.png").exists());
    assert!(fx.entry("alpha-copy.png").exists());

    let unbound = fx.links.delete(&fx.policy, "alpha-copy.png").await.unwrap();
    assert!(unbound.was_last_reference());

    let err = fx.links.delete(&fx.policy, "alpha-copy.png").await.unwrap_err();
    assert!(err.is_link_not_found());
}

#[tokio::test]
async fn test_delete_tolerates_missing_entry() {
    let fx = Fixture::new();
    let blob = fx.blob(b"alpha").await;
    fx.links.create(&fx.policy, "alpha.png", &blob, None).await.unwrap();
    std::fs::remove_file(fx.entry("alpha.png")).unwrap();

    let unbound = fx.links.delete(&fx.policy, "alpha.png").await.unwrap();
    assert!(unbound.was_last_reference());
}

#[tokio::test]
async fn test_resolve_missing_link() {
    let fx = Fixture::new();
    let err = fx.links.resolve("team-logo", "nope.png").await.unwrap_err();
    assert!(err.is_link_not_found());
}

#[tokio::test]
async fn test_expired_is_strict_and_paginated() {
    let fx = Fixture::new();
    let blob = fx.blob(b"alpha").await;
    let now = Utc::now();

    // Bind directly so expiry timestamps are exact.
    let bind = |name: &str, expires_at| {
        fx.catalog
            .bind_link(LinkRecord::new("team-logo", name, *blob.id(), expires_at, now))
    };
    for (i, name) in ["a.png", "b.png", "c.png", "d.png", "e.png"].into_iter().enumerate() {
        bind(name, Some(now - ChronoDuration::seconds(10 - i as i64))).await.unwrap();
    }
    bind("at-deadline.png", Some(now)).await.unwrap();
    bind("future.png", Some(now + ChronoDuration::seconds(10))).await.unwrap();
    bind("forever.png", None).await.unwrap();

    let expired: Vec<_> = fx.links.expired(now).try_collect().await.unwrap();
    let names: Vec<_> = expired.iter().map(|l| l.name().as_str()).collect();
    assert_eq!(names, ["a.png", "b.png", "c.png", "d.png", "e.png"]);
}

#[tokio::test]
async fn test_expired_survives_deletion_while_streaming() {
    let fx = Fixture::new();
    let blob = fx.blob(b"alpha").await;
    let now = Utc::now();
    for i in 0..5 {
        fx.catalog
            .bind_link(LinkRecord::new(
                "team-logo",
                format!("{i}.png"),
                *blob.id(),
                Some(now - ChronoDuration::seconds(1)),
                now,
            ))
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    let mut stream = Box::pin(fx.links.expired(now));
    while let Some(link) = stream.try_next().await.unwrap() {
        fx.catalog
            .unbind_link(link.media_class(), link.name())
            .await
            .unwrap();
        seen.push(link.name().clone());
    }

    assert_eq!(seen, ["0.png", "1.png", "2.png", "3.png", "4.png"]);
    assert_eq!(fx.catalog.link_count().await, 0);
}

#[tokio::test]
async fn test_empty_expiry_scan() {
    let fx = Fixture::new();
    let expired: Vec<_> = fx.links.expired(Utc::now()).try_collect().await.unwrap();
    assert!(expired.is_empty());
}
