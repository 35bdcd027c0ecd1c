//! Error types for the Insignia media store.
//!
//! This crate provides the foundation error types used throughout the Insignia workspace.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern for clean error handling:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All errors use `#[track_caller]` for automatic location capture
//!
//! The top-level [`InsigniaError`] groups them by the way callers react:
//!
//! | kind | caller reaction |
//! |------|-----------------|
//! | [`ValidationError`] | fix the input and resubmit; nothing was mutated |
//! | [`NotFoundError`] | 404-equivalent |
//! | [`StorageError`] | filesystem failure or storage inconsistency |
//! | [`CoordinationError`] | transient; retried with backoff before surfacing |
//!
//! # Examples
//!
//! ```
//! use insignia_error::{InsigniaResult, NotFoundError, NotFoundErrorKind};
//!
//! fn lookup(name: &str) -> InsigniaResult<Vec<u8>> {
//!     Err(NotFoundError::new(NotFoundErrorKind::Link {
//!         media_class: "team-logo".to_string(),
//!         name: name.to_string(),
//!     }))?
//! }
//!
//! let err = lookup("alpha.png").unwrap_err();
//! assert!(err.is_not_found());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod coordination;
#[cfg(feature = "database")]
mod database;
mod error;
mod not_found;
mod render;
mod retry;
mod storage;
mod validation;

pub use config::ConfigError;
pub use coordination::{CoordinationError, CoordinationErrorKind};
#[cfg(feature = "database")]
pub use database::{DatabaseError, DatabaseErrorKind};
pub use error::{InsigniaError, InsigniaErrorKind, InsigniaResult};
pub use not_found::{NotFoundError, NotFoundErrorKind};
pub use render::RenderError;
pub use retry::RetryableError;
pub use storage::{StorageError, StorageErrorKind};
pub use validation::{ValidationError, ValidationErrorKind};
