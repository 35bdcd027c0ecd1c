//! Configuration loading tests.

use insignia::{HashAlgorithm, InsigniaConfig, SweepSchedule};
use std::time::Duration;
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("insignia.toml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_file_overrides_bundled_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
            [storage]
            blob_root = "/srv/media/blobs"
            link_root = "/srv/media/links"

            [coordination]
            retry_attempts = 7

            [sweep.schedule]
            type = "interval"
            seconds = 900
        "#,
    );

    let config = InsigniaConfig::from_file(&path).unwrap();

    assert_eq!(config.storage.blob_root, std::path::Path::new("/srv/media/blobs"));
    assert_eq!(config.coordination.retry_attempts, 7);
    assert_eq!(config.coordination.io_timeout_ms, 10_000);
    assert_eq!(config.sweep.schedule, SweepSchedule::Interval { seconds: 900 });
    assert_eq!(config.sweep.page_size, 256);
}

#[test]
fn test_media_classes_extend_and_replace_builtins() {
    let config = InsigniaConfig::from_toml(
        r#"
            [[media_classes]]
            media_class = "sponsor-logo"
            accepted_types = ["image/png"]
            hash_algorithm = "perceptual-image"
            max_size = 1048576
            ttl_seconds = 3600

            [[media_classes]]
            media_class = "font"
            accepted_types = ["application/font-sfnt"]
            hash_algorithm = "exact-content"
            max_size = 1024
        "#,
    )
    .unwrap();

    let table = config.policy_table();
    let sponsor = table.resolve("sponsor-logo").unwrap();
    assert_eq!(*sponsor.hash_algorithm(), HashAlgorithm::PerceptualImage);
    assert_eq!(sponsor.ttl(), Some(Duration::from_secs(3600)));
    assert_eq!(*table.resolve("font").unwrap().max_size(), 1024);
    assert!(table.resolve("team-logo").is_ok());
}

#[test]
fn test_invalid_values_are_rejected() {
    let bad_cron = InsigniaConfig::from_toml(
        r#"
            [sweep.schedule]
            type = "cron"
            expression = "every tuesday"
        "#,
    );
    assert!(bad_cron.is_err());

    let no_pool = InsigniaConfig::from_toml("[database]\npool_size = 0").unwrap_err();
    assert!(no_pool.to_string().contains("pool_size"));

    let unknown_field = InsigniaConfig::from_toml(
        r#"
            [[media_classes]]
            media_class = "x"
            accepted_types = []
            hash_algorithm = "exact-content"
            colour = "red"
        "#,
    );
    assert!(unknown_field.is_err());
}

#[test]
fn test_load_applies_explicit_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[database]\nurl = \"postgres://db.internal/media\"\npool_size = 3\n");

    let config = InsigniaConfig::load(Some(path.as_path())).unwrap();

    assert_eq!(config.database.url.as_deref(), Some("postgres://db.internal/media"));
    assert_eq!(config.database.pool_size, 3);
    assert_eq!(config.database.resolve_url().unwrap(), "postgres://db.internal/media");
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(InsigniaConfig::load(Some(dir.path().join("absent.toml").as_path())).is_err());
}
