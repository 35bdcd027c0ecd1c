//! Top-level error wrapper types.

#[cfg(feature = "database")]
use crate::DatabaseError;
use crate::{
    ConfigError, CoordinationError, CoordinationErrorKind, NotFoundError, NotFoundErrorKind,
    RenderError, RetryableError, StorageError, ValidationError,
};

/// The foundation error enum; one variant per error family.
///
/// # Examples
///
/// ```
/// use insignia_error::{InsigniaError, StorageError, StorageErrorKind};
///
/// let storage_err = StorageError::new(StorageErrorKind::FileWrite("disk full".to_string()));
/// let err: InsigniaError = storage_err.into();
/// assert!(format!("{}", err).contains("Storage Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum InsigniaErrorKind {
    /// Input rejected before any mutation
    #[from(ValidationError)]
    Validation(ValidationError),
    /// Link, blob or template not found
    #[from(NotFoundError)]
    NotFound(NotFoundError),
    /// Filesystem failure or storage inconsistency
    #[from(StorageError)]
    Storage(StorageError),
    /// Persistence layer failure
    #[cfg(feature = "database")]
    #[from(DatabaseError)]
    Database(DatabaseError),
    /// Timeout or conflict while coordinating a transactional unit
    #[from(CoordinationError)]
    Coordination(CoordinationError),
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
    /// Template rendering error
    #[from(RenderError)]
    Render(RenderError),
}

/// Insignia error with kind discrimination.
///
/// # Examples
///
/// ```
/// use insignia_error::{ConfigError, InsigniaResult};
///
/// fn might_fail() -> InsigniaResult<()> {
///     Err(ConfigError::new("Missing field"))?
/// }
///
/// match might_fail() {
///     Ok(_) => println!("Success"),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Insignia Error: {}", _0)]
pub struct InsigniaError(Box<InsigniaErrorKind>);

impl InsigniaError {
    /// Create a new error from a kind.
    pub fn new(kind: InsigniaErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &InsigniaErrorKind {
        &self.0
    }

    /// True for any not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind(), InsigniaErrorKind::NotFound(_))
    }

    /// True when the error reports a missing link.
    pub fn is_link_not_found(&self) -> bool {
        matches!(
            self.kind(),
            InsigniaErrorKind::NotFound(NotFoundError {
                kind: NotFoundErrorKind::Link { .. },
                ..
            })
        )
    }

    /// True for validation failures.
    pub fn is_validation(&self) -> bool {
        matches!(self.kind(), InsigniaErrorKind::Validation(_))
    }
}

// Generic From implementation for any type that converts to InsigniaErrorKind
impl<T> From<T> for InsigniaError
where
    T: Into<InsigniaErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

impl RetryableError for InsigniaError {
    fn is_retryable(&self) -> bool {
        match self.kind() {
            InsigniaErrorKind::Coordination(err) => {
                !matches!(err.kind, CoordinationErrorKind::Exhausted { .. })
            }
            #[cfg(feature = "database")]
            InsigniaErrorKind::Database(err) => matches!(
                err.kind,
                crate::DatabaseErrorKind::Conflict(_)
                    | crate::DatabaseErrorKind::Connection(_)
                    | crate::DatabaseErrorKind::Pool(_)
            ),
            _ => false,
        }
    }
}

/// Result type for Insignia operations.
pub type InsigniaResult<T> = std::result::Result<T, InsigniaError>;
