//! PostgreSQL integration for Insignia.
//!
//! This crate provides the Diesel schema, embedded migrations and the
//! PostgreSQL adapters for the catalog and template ports.
//!
//! # Features
//!
//! - r2d2 connection pool; blocking Diesel work runs on tokio's blocking pool
//! - `(media_class, digest)` unique index with insert-on-conflict claims
//! - row locks (`FOR UPDATE` / `FOR SHARE`) around unbind, bind and release
//! - keyset pagination over expired links
//!
//! # Example
//!
//! ```rust,ignore
//! use insignia_database::{establish_pool, run_migrations, PostgresMediaCatalog};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = establish_pool("postgres://localhost/insignia", 8)?;
//! run_migrations(&mut pool.get()?)?;
//! let catalog = PostgresMediaCatalog::new(pool);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod catalog_repository;
mod connection;
mod models;
mod template_repository;

/// Diesel table definitions.
#[allow(missing_docs)]
pub mod schema;

pub use catalog_repository::PostgresMediaCatalog;
pub use connection::{establish_connection, establish_pool, run_migrations, DbPool};
pub use models::{BlobRow, LinkRow, TemplateRow};
pub use template_repository::PostgresTemplateRepository;

use insignia_error::DatabaseError;

/// Result type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;
