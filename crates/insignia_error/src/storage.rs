//! Storage error types.

/// Kinds of storage errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum StorageErrorKind {
    /// Failed to create storage directory
    #[display("Failed to create storage directory: {}", _0)]
    DirectoryCreation(String),
    /// Failed to write file
    #[display("Failed to write file: {}", _0)]
    FileWrite(String),
    /// Failed to read file
    #[display("Failed to read file: {}", _0)]
    FileRead(String),
    /// Failed to remove a file or link entry
    #[display("Failed to remove file: {}", _0)]
    FileRemove(String),
    /// Failed to create a link entry in the link namespace
    #[display("Failed to create link: {}", _0)]
    LinkCreation(String),
    /// Invalid storage path
    #[display("Invalid storage path: {}", _0)]
    InvalidPath(String),
    /// Registered blob without bytes, or bytes without a registration
    #[display("Storage inconsistency: {}", _0)]
    Inconsistency(String),
    /// Background task panicked or was cancelled
    #[display("Storage task failed: {}", _0)]
    Task(String),
}

/// Storage error with location tracking.
///
/// # Examples
///
/// ```
/// use insignia_error::{StorageError, StorageErrorKind};
///
/// let err = StorageError::new(StorageErrorKind::FileRead("/srv/cdn/x.png".to_string()));
/// assert!(format!("{}", err).contains("Failed to read file"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Storage Error: {} at line {} in {}", kind, line, file)]
pub struct StorageError {
    /// The kind of error that occurred
    pub kind: StorageErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl StorageError {
    /// Create a new storage error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: StorageErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
