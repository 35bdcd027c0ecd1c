//! Validation error types.
//!
//! Validation errors are raised before any storage mutation happens, so the caller
//! can always retry with corrected input.

/// Kinds of validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum ValidationErrorKind {
    /// The declared media class is not in the policy table
    #[display("Unknown media class: {}", _0)]
    UnknownMediaClass(String),
    /// Detected content type is not accepted by the media class
    #[display("Invalid content type {detected} for {media_class} (accepted: {})", accepted.join(", "))]
    InvalidContentType {
        /// Media class the content was submitted under
        media_class: String,
        /// Detected MIME type, or "unknown" if detection failed; suffixed
        /// with the decode error when the content does not decode
        detected: String,
        /// MIME types the class accepts
        accepted: Vec<String>,
    },
    /// Content exceeds the class size limit
    #[display("Content too large: {size} bytes exceeds limit of {max} bytes for {media_class}")]
    ContentTooLarge {
        /// Media class the content was submitted under
        media_class: String,
        /// Submitted size in bytes
        size: u64,
        /// Maximum size in bytes
        max: u64,
    },
    /// Link name is not a single safe path component
    #[display("Invalid link name {name:?}: {reason}")]
    InvalidLinkName {
        /// The rejected name
        name: String,
        /// Why it was rejected
        reason: String,
    },
    /// Link name is already bound to different content
    #[display("Link {name} already exists in {media_class}")]
    LinkAlreadyExists {
        /// Media class namespace
        media_class: String,
        /// The bound name
        name: String,
    },
}

/// Validation error with location tracking.
///
/// # Examples
///
/// ```
/// use insignia_error::{ValidationError, ValidationErrorKind};
///
/// let err = ValidationError::new(ValidationErrorKind::UnknownMediaClass("banner".to_string()));
/// assert!(format!("{}", err).contains("Unknown media class: banner"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Validation Error: {} at line {} in {}", kind, line, file)]
pub struct ValidationError {
    /// The kind of error that occurred
    pub kind: ValidationErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl ValidationError {
    /// Create a new validation error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: ValidationErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
