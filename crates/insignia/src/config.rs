//! Layered configuration.
//!
//! Sources, later overriding earlier:
//! 1. Bundled defaults (insignia.toml shipped with the crate)
//! 2. User config in the home directory (~/.config/insignia/insignia.toml)
//! 3. User config in the current directory (./insignia.toml)
//! 4. An explicit file, e.g. from `--config`
//! 5. Environment variables `INSIGNIA__SECTION__KEY`
//!
//! User config files are optional and silently skipped when missing.

use config::{Config, Environment, File, FileFormat};
use insignia_core::{MediaPolicy, PolicyTable};
use insignia_error::{ConfigError, InsigniaResult};
use insignia_service::{RetryPolicy, SweepSchedule};
use insignia_storage::IoLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

/// Bundled default configuration.
const DEFAULT_CONFIG: &str = include_str!("../../../insignia.toml");

/// Filesystem roots.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding blob bytes
    pub blob_root: PathBuf,
    /// Directory holding the per-class link namespaces
    pub link_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blob_root: PathBuf::from("/var/lib/insignia/blobs"),
            link_root: PathBuf::from("/var/lib/insignia/links"),
        }
    }
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Connection URL; `DATABASE_URL` is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Maximum pooled connections
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

fn default_pool_size() -> u32 {
    8
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: default_pool_size(),
        }
    }
}

impl DatabaseConfig {
    /// The configured URL, or `DATABASE_URL` from the environment (after `.env`).
    ///
    /// # Errors
    ///
    /// `ConfigError` if neither is set.
    pub fn resolve_url(&self) -> InsigniaResult<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }
        let _ = dotenvy::dotenv();
        std::env::var("DATABASE_URL").map_err(|_| {
            ConfigError::new("database.url is not set and DATABASE_URL is not in the environment")
                .into()
        })
    }
}

/// Timeouts and retry budget for catalog and filesystem calls.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CoordinationConfig {
    /// Deadline for a single catalog or filesystem call
    pub io_timeout_ms: u64,
    /// Attempts per operation, including the first
    pub retry_attempts: usize,
    /// First retry delay
    pub initial_backoff_ms: u64,
    /// Retry delay cap
    pub max_backoff_ms: u64,
    /// Age after which a pending claim left by a crashed writer may be taken over
    pub claim_stale_after_secs: u64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            io_timeout_ms: 10_000,
            retry_attempts: 4,
            initial_backoff_ms: 50,
            max_backoff_ms: 2_000,
            claim_stale_after_secs: 300,
        }
    }
}

impl CoordinationConfig {
    /// I/O limits for the storage layer.
    pub fn io_limits(&self) -> IoLimits {
        IoLimits::new(
            Duration::from_millis(self.io_timeout_ms),
            Duration::from_secs(self.claim_stale_after_secs),
        )
    }

    /// Retry policy for the service layer.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

/// Expiry sweeper settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SweepConfig {
    /// When the sweeper runs
    #[serde(default)]
    pub schedule: SweepSchedule,
    /// Expired links fetched per catalog round trip
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    256
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            schedule: SweepSchedule::default(),
            page_size: default_page_size(),
        }
    }
}

/// Top-level Insignia configuration.
///
/// # Example
///
/// ```no_run
/// use insignia::InsigniaConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = InsigniaConfig::load(None)?;
/// println!("blobs under {}", config.storage.blob_root.display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct InsigniaConfig {
    /// Filesystem roots
    #[serde(default)]
    pub storage: StorageConfig,
    /// Database connection
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Timeouts and retries
    #[serde(default)]
    pub coordination: CoordinationConfig,
    /// Expiry sweeper
    #[serde(default)]
    pub sweep: SweepConfig,
    /// Additional media classes, or replacements of built-in ones by class name
    #[serde(default)]
    pub media_classes: Vec<MediaPolicy>,
}

fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> InsigniaResult<InsigniaConfig> {
    let config: InsigniaConfig = builder
        .build()
        .map_err(|e| ConfigError::new(format!("Failed to build configuration: {}", e)))?
        .try_deserialize()
        .map_err(|e| ConfigError::new(format!("Failed to parse configuration: {}", e)))?;
    config.validate()?;
    Ok(config)
}

impl InsigniaConfig {
    /// Load configuration from the layered sources, with `explicit` (if any)
    /// applied after the user files and before the environment.
    ///
    /// # Errors
    ///
    /// `ConfigError` if a source cannot be read or parsed, an explicit file is
    /// missing, or the result fails [`validate`](Self::validate).
    #[instrument]
    pub fn load(explicit: Option<&Path>) -> InsigniaResult<Self> {
        debug!("Loading configuration");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/insignia/insignia.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("insignia").required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path));
        }

        build(builder.add_source(
            Environment::with_prefix("INSIGNIA")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        ))
    }

    /// Load the bundled defaults overlaid with a single file, ignoring user
    /// files and the environment.
    ///
    /// # Errors
    ///
    /// `ConfigError` if the file cannot be read or parsed, or fails validation.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> InsigniaResult<Self> {
        debug!("Loading configuration from file");
        build(
            Config::builder()
                .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
                .add_source(File::from(path.as_ref())),
        )
    }

    /// Parse configuration from a TOML string overlaid on the bundled defaults.
    ///
    /// # Errors
    ///
    /// `ConfigError` if the string cannot be parsed or fails validation.
    pub fn from_toml(toml: &str) -> InsigniaResult<Self> {
        build(
            Config::builder()
                .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
                .add_source(File::from_str(toml, FileFormat::Toml)),
        )
    }

    /// Reject values the services cannot run with.
    ///
    /// # Errors
    ///
    /// `ConfigError` naming the offending key.
    pub fn validate(&self) -> InsigniaResult<()> {
        if self.database.pool_size == 0 {
            return Err(ConfigError::new("database.pool_size must be at least 1").into());
        }
        if self.coordination.retry_attempts == 0 {
            return Err(ConfigError::new("coordination.retry_attempts must be at least 1").into());
        }
        if self.coordination.io_timeout_ms == 0 {
            return Err(ConfigError::new("coordination.io_timeout_ms must be positive").into());
        }
        if self.sweep.page_size == 0 {
            return Err(ConfigError::new("sweep.page_size must be at least 1").into());
        }
        self.sweep.schedule.validate()
    }

    /// Built-in media classes merged with the configured ones.
    pub fn policy_table(&self) -> PolicyTable {
        let mut table = PolicyTable::builtin();
        table.merge(self.media_classes.iter().cloned());
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_defaults_parse() {
        let config = InsigniaConfig::from_toml("").unwrap();
        assert_eq!(config.coordination, CoordinationConfig::default());
        assert_eq!(config.sweep, SweepConfig::default());
        assert_eq!(config.database.pool_size, 8);
        assert!(config.database.url.is_none());
        assert!(config.media_classes.is_empty());
    }

    #[test]
    fn coordination_maps_to_limits_and_retry() {
        let coordination = CoordinationConfig::default();
        assert_eq!(*coordination.io_limits().timeout(), Duration::from_secs(10));
        assert_eq!(*coordination.io_limits().claim_stale_after(), Duration::from_secs(300));
        assert_eq!(coordination.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let err = InsigniaConfig::from_toml("[sweep]\npage_size = 0").unwrap_err();
        assert!(err.to_string().contains("sweep.page_size"));
    }
}
