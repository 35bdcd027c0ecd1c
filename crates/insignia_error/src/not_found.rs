//! Not-found error types.

/// What could not be found.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum NotFoundErrorKind {
    /// No link with this name in the class namespace
    #[display("Link not found: {media_class}/{name}")]
    Link {
        /// Media class namespace
        media_class: String,
        /// Link name
        name: String,
    },
    /// No stored blob with this identifier, or its bytes are gone
    #[display("Blob not found: {}", _0)]
    Blob(String),
    /// No template for this type and tournament
    #[display("No {template_type} template for tournament {tournament_id}")]
    Template {
        /// Template type
        template_type: String,
        /// Tournament identifier
        tournament_id: i64,
    },
}

/// Not-found error with location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Not Found: {} at line {} in {}", kind, line, file)]
pub struct NotFoundError {
    /// The kind of error that occurred
    pub kind: NotFoundErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl NotFoundError {
    /// Create a new not-found error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: NotFoundErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
