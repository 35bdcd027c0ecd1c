//! Ports for the Insignia media store.
//!
//! This crate defines the traits the storage and service layers are written
//! against, together with the value types that cross them:
//!
//! - [`MediaCatalog`]: transactional registry of blobs and links
//! - [`TemplateRepository`]: template metadata persistence
//! - [`TemplateRenderer`]: image composition behind templates

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod traits;
mod types;

pub use traits::{MediaCatalog, TemplateRenderer, TemplateRepository};
pub use types::{BlobClaim, LinkBinding, LinkCursor, Unbound};
