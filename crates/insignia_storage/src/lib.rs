//! Content-addressed media storage for Insignia.
//!
//! Blobs live under a blob root keyed by media class and [`BlobId`]; links
//! live under a link root as per-class namespaces of hard (or, across
//! devices, symbolic) links into the blob root. The [`MediaCatalog`] port is
//! authoritative: physical state is created after and removed after the
//! catalog commits, and every physical operation is idempotent.
//!
//! # Layout
//!
//! ```text
//! /srv/insignia/
//! ├── blobs/
//! │   ├── team-logo/
//! │   │   └── 9f1c…e2.png
//! │   └── font/
//! │       └── 03ab…77.ttf
//! └── links/
//!     ├── team-logos/
//!     │   ├── alpha.png       → blobs/team-logo/9f1c…e2.png
//!     │   └── alpha-copy.png  → blobs/team-logo/9f1c…e2.png
//!     └── fonts/
//!         └── Inter.ttf       → blobs/font/03ab…77.ttf
//! ```
//!
//! [`BlobId`]: insignia_core::BlobId
//! [`MediaCatalog`]: insignia_interface::MediaCatalog

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod bounded;
mod content_store;
mod filesystem;
mod link_namespace;
mod link_table;
mod memory;

pub use bounded::{bounded, IoLimits};
pub use content_store::{ContentStore, StoredBlob};
pub use filesystem::BlobFiles;
pub use link_namespace::LinkNamespace;
pub use link_table::LinkTable;
pub use memory::{InMemoryMediaCatalog, InMemoryTemplateRepository};
