//! Coordination error types.
//!
//! Raised when the persistence or filesystem layer could not complete a
//! transactional unit in time, or a concurrent writer held the unit.

/// Kinds of coordination failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum CoordinationErrorKind {
    /// An operation exceeded its I/O deadline
    #[display("{operation} timed out after {millis}ms")]
    Timeout {
        /// Name of the bounded operation
        operation: String,
        /// Deadline in milliseconds
        millis: u64,
    },
    /// Another writer is storing the same content right now
    #[display("Content {digest} in {media_class} is being written by another request")]
    ClaimInFlight {
        /// Media class of the claimed content
        media_class: String,
        /// Digest of the claimed content
        digest: String,
    },
    /// Referenced blob was released between lookup and bind
    #[display("Blob {} was released concurrently", _0)]
    BlobReleased(String),
    /// Retry budget exhausted
    #[display("{operation} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Name of the retried operation
        operation: String,
        /// Number of attempts made
        attempts: usize,
        /// Rendering of the final error
        last_error: String,
    },
}

/// Coordination error with location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Coordination Error: {} at line {} in {}", kind, line, file)]
pub struct CoordinationError {
    /// The kind of error that occurred
    pub kind: CoordinationErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl CoordinationError {
    /// Create a new coordination error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: CoordinationErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
