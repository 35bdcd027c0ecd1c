//! StoreMedia / RetrieveMedia / DeleteMedia over the in-memory catalog.

mod test_utils;

use chrono::{Duration as ChronoDuration, Utc};
use insignia_error::{InsigniaErrorKind, ValidationError, ValidationErrorKind};
use insignia_service::{DeletionContext, DeletionOutcome};
use std::collections::HashSet;
use test_utils::{large_png, png, ttf, Harness};

fn validation_kind(err: &insignia_error::InsigniaError) -> &ValidationErrorKind {
    match err.kind() {
        InsigniaErrorKind::Validation(ValidationError { kind, .. }) => kind,
        other => panic!("expected a validation error, got {other}"),
    }
}

#[tokio::test]
async fn test_alpha_scenario() {
    let h = Harness::new();
    let bytes = large_png(2 * 1024 * 1024, 7);
    assert!(bytes.len() > 2_000_000);

    let first = h.media.store_media(bytes.clone(), "team-logo", "alpha.png").await.unwrap();
    assert!(!first.deduplicated());
    assert_eq!(h.media.retrieve_media("team-logo", "alpha.png").await.unwrap(), bytes);

    let copy = h
        .media
        .store_media(bytes.clone(), "team-logo", "alpha-copy.png")
        .await
        .unwrap();
    assert!(copy.deduplicated());
    assert_eq!(copy.blob_id(), first.blob_id());
    assert_eq!(h.blob_files("team-logo"), 1);
    assert_eq!(h.media.retrieve_media("team-logo", "alpha-copy.png").await.unwrap(), bytes);

    let outcome = h.media.delete_media("team-logo", "alpha.png").await.unwrap();
    assert!(matches!(outcome, DeletionOutcome::Deleted { blob_deleted: false, .. }));
    assert!(!h.link_entry("team-logo", "alpha.png").exists());
    assert_eq!(h.blob_files("team-logo"), 1);
    assert_eq!(h.media.retrieve_media("team-logo", "alpha-copy.png").await.unwrap(), bytes);

    let outcome = h.media.delete_media("team-logo", "alpha-copy.png").await.unwrap();
    assert!(outcome.blob_deleted());
    assert_eq!(h.blob_files("team-logo"), 0);
    assert_eq!(h.catalog.blob_count().await, 0);

    for name in ["alpha.png", "alpha-copy.png"] {
        let err = h.media.retrieve_media("team-logo", name).await.unwrap_err();
        assert!(err.is_not_found());
    }
}

#[tokio::test]
async fn test_concurrent_identical_stores_write_once() {
    let h = Harness::new();
    let bytes = png(1);

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let media = h.media.clone();
            let bytes = bytes.clone();
            tokio::spawn(async move {
                media
                    .store_media(bytes, "clan-badge", &format!("badge-{i}.png"))
                    .await
            })
        })
        .collect();

    let mut ids = HashSet::new();
    let mut writes = 0;
    for task in tasks {
        let stored = task.await.unwrap().unwrap();
        ids.insert(*stored.blob_id());
        if !stored.deduplicated() {
            writes += 1;
        }
    }

    assert_eq!(ids.len(), 1);
    assert_eq!(writes, 1);
    assert_eq!(h.catalog.blob_count().await, 1);
    assert_eq!(h.catalog.link_count().await, 8);
    assert_eq!(h.blob_files("clan-badge"), 1);
}

#[tokio::test]
async fn test_same_content_in_other_class_is_separate() {
    let h = Harness::new();
    let bytes = png(2);

    let badge = h.media.store_media(bytes.clone(), "clan-badge", "x.png").await.unwrap();
    let logo = h.media.store_media(bytes, "league-logo", "x.png").await.unwrap();

    assert_ne!(badge.blob_id(), logo.blob_id());
    assert_eq!(badge.digest(), logo.digest());
}

#[tokio::test]
async fn test_distinct_images_get_distinct_blobs() {
    let h = Harness::new();
    let a = h.media.store_media(png(3), "clan-badge", "a.png").await.unwrap();
    let b = h.media.store_media(png(4), "clan-badge", "b.png").await.unwrap();

    assert_ne!(a.digest(), b.digest());
    assert_ne!(a.blob_id(), b.blob_id());
    assert_eq!(h.blob_files("clan-badge"), 2);
}

#[tokio::test]
async fn test_store_is_idempotent_per_name() {
    let h = Harness::new();
    let first = h.media.store_media(png(5), "clan-badge", "same.png").await.unwrap();
    let again = h.media.store_media(png(5), "clan-badge", "same.png").await.unwrap();

    assert_eq!(first.link(), again.link());
    assert!(again.deduplicated());
    assert_eq!(h.catalog.link_count().await, 1);
}

#[tokio::test]
async fn test_name_bound_to_other_content_is_rejected() {
    let h = Harness::new();
    h.media.store_media(png(6), "clan-badge", "taken.png").await.unwrap();

    let err = h
        .media
        .store_media(png(7), "clan-badge", "taken.png")
        .await
        .unwrap_err();
    assert!(matches!(validation_kind(&err), ValidationErrorKind::LinkAlreadyExists { .. }));
    assert_eq!(h.media.retrieve_media("clan-badge", "taken.png").await.unwrap(), png(6));
    assert_eq!(h.catalog.blob_count().await, 1);
    assert_eq!(h.blob_files("clan-badge"), 1);
}

#[tokio::test]
async fn test_rejected_name_keeps_shared_content() {
    let h = Harness::new();
    h.media.store_media(png(6), "team-logo", "taken.png").await.unwrap();
    h.media.store_media(png(7), "team-logo", "other.png").await.unwrap();

    // The content is already stored under another name, so the failed
    // store must not release it.
    let err = h
        .media
        .store_media(png(7), "team-logo", "taken.png")
        .await
        .unwrap_err();
    assert!(matches!(validation_kind(&err), ValidationErrorKind::LinkAlreadyExists { .. }));
    assert_eq!(h.catalog.blob_count().await, 2);
    assert_eq!(h.blob_files("team-logo"), 2);
    assert_eq!(h.media.retrieve_media("team-logo", "other.png").await.unwrap(), png(7));
}

#[tokio::test]
async fn test_oversize_leaves_nothing() {
    let h = Harness::new();
    let mut bytes = png(8);
    bytes.resize(9 * 1024 * 1024, 0);

    let err = h.media.store_media(bytes, "team-logo", "huge.png").await.unwrap_err();

    assert!(matches!(validation_kind(&err), ValidationErrorKind::ContentTooLarge { .. }));
    assert_eq!(h.catalog.blob_count().await, 0);
    assert_eq!(h.catalog.link_count().await, 0);
    assert_eq!(h.blob_files("team-logo"), 0);
    assert!(!h.link_entry("team-logo", "huge.png").exists());
}

#[tokio::test]
async fn test_rejected_inputs() {
    let h = Harness::new();

    let err = h.media.store_media(b"plain text".to_vec(), "team-logo", "a.png").await.unwrap_err();
    assert!(matches!(validation_kind(&err), ValidationErrorKind::InvalidContentType { .. }));

    let err = h.media.store_media(png(9), "banner", "a.png").await.unwrap_err();
    assert!(matches!(validation_kind(&err), ValidationErrorKind::UnknownMediaClass(_)));

    let err = h.media.store_media(png(9), "team-logo", "../a.png").await.unwrap_err();
    assert!(matches!(validation_kind(&err), ValidationErrorKind::InvalidLinkName { .. }));

    let err = h.media.store_media(png(9), "font", "a.ttf").await.unwrap_err();
    assert!(matches!(validation_kind(&err), ValidationErrorKind::InvalidContentType { .. }));

    assert_eq!(h.catalog.blob_count().await, 0);
}

#[tokio::test]
async fn test_fonts_use_exact_digest() {
    let h = Harness::new();
    let font = ttf(b"glyphs");

    let stored = h.media.store_media(font.clone(), "font", "body.ttf").await.unwrap();
    assert_eq!(stored.digest().as_str().len(), 64);
    assert!(stored.blob().location().to_string_lossy().ends_with(".ttf"));
    assert!(stored.link().expires_at().is_none());
    assert_eq!(h.media.retrieve_media("font", "body.ttf").await.unwrap(), font);

    let other = h.media.store_media(ttf(b"glyphz"), "font", "other.ttf").await.unwrap();
    assert_ne!(other.digest(), stored.digest());
}

#[tokio::test]
async fn test_team_logo_links_expire_after_half_a_year() {
    let h = Harness::new();
    let before = Utc::now();
    let stored = h.media.store_media(png(10), "team-logo", "t.png").await.unwrap();

    let expires_at = stored.link().expires_at().unwrap();
    let ttl = ChronoDuration::seconds(15_778_800);
    assert!(expires_at >= before + ttl);
    assert!(expires_at <= Utc::now() + ttl);
}

#[tokio::test]
async fn test_missing_link_by_context() {
    let h = Harness::new();

    let err = h.media.delete_media("team-logo", "ghost.png").await.unwrap_err();
    assert!(err.is_link_not_found());

    let outcome = h
        .media
        .remove_link("team-logo", "ghost.png", DeletionContext::Sweep)
        .await
        .unwrap();
    assert_eq!(outcome, DeletionOutcome::AlreadyGone);
}

#[tokio::test]
async fn test_retrieve_missing_link() {
    let h = Harness::new();
    let err = h.media.retrieve_media("team-logo", "nothing.png").await.unwrap_err();
    assert!(err.is_link_not_found());
}
