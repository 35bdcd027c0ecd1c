//! Core data types for the Insignia media store.
//!
//! This crate provides the data model shared by every other Insignia crate
//! (blobs, links, templates), the table-driven [`MediaPolicy`] configuration,
//! and the pure [`MediaClassifier`] that resolves a declared media class,
//! validates submitted bytes against it and computes the content digest used
//! as the deduplication key.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod classifier;
mod hashing;
mod ids;
mod policy;
mod records;
mod template;

pub use classifier::{ContentType, MediaClassifier, MAX_LINK_NAME_BYTES};
pub use ids::{BlobId, ContentDigest};
pub use policy::{HashAlgorithm, MediaPolicy, PolicyTable, DEFAULT_MAX_SIZE};
pub use records::{BlobRecord, BlobState, LinkRecord};
pub use template::{
    Color, HorizontalAlign, ImagePlaceholder, Offset, Placeholder, Size, TemplateKey,
    TemplateRecord, TextAlignment, TextPlaceholder, TextWrap, VerticalAlign, TEMPLATE_MEDIA_CLASS,
};
