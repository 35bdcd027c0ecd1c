//! Insignia - deduplicating media store
//!
//! Insignia stores uploaded media (team logos, badges, template backgrounds,
//! fonts) once per distinct content and hands out human-readable named links
//! to it. Images are deduplicated by a perceptual fingerprint, everything else
//! by exact content hash. A blob is deleted exactly when its last link goes,
//! and links may expire, in which case a scheduled sweeper removes them.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use insignia::{Insignia, InsigniaConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = InsigniaConfig::load(None)?;
//!     let insignia = Insignia::connect(&config).await?;
//!
//!     let png = std::fs::read("alpha.png")?;
//!     let stored = insignia.media().store_media(png, "team-logo", "alpha.png").await?;
//!     println!("{} deduplicated: {}", stored.link().name(), stored.deduplicated());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! Insignia is organized as a workspace with focused crates:
//!
//! - `insignia-error` - Error types
//! - `insignia-core` - Records, media policies and the classifier
//! - `insignia-interface` - Persistence and rendering ports
//! - `insignia-storage` - Content store, link table and in-memory adapters
//! - `insignia-database` - PostgreSQL adapters
//! - `insignia-service` - Media operations, expiry sweeper and templates
//!
//! This crate (`insignia`) re-exports everything for convenience and adds
//! configuration loading, service wiring and the `insignia` binary.

mod app;
mod config;
pub mod observability;

pub use app::{migrate, Insignia};
pub use config::{
    CoordinationConfig, DatabaseConfig, InsigniaConfig, StorageConfig, SweepConfig,
};

pub use insignia_core::*;
pub use insignia_database::*;
pub use insignia_error::*;
pub use insignia_interface::*;
pub use insignia_service::*;
pub use insignia_storage::*;
