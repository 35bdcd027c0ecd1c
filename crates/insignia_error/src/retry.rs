//! Classification of transient errors.

/// Trait for errors that can be classified as retryable.
///
/// The retry policy consults this to decide between backing off and failing
/// immediately.
///
/// # Examples
///
/// ```
/// use insignia_error::{
///     CoordinationError, CoordinationErrorKind, InsigniaError, RetryableError, ValidationError,
///     ValidationErrorKind,
/// };
///
/// let timeout: InsigniaError = CoordinationError::new(CoordinationErrorKind::Timeout {
///     operation: "claim_blob".to_string(),
///     millis: 10_000,
/// })
/// .into();
/// assert!(timeout.is_retryable());
///
/// let bad: InsigniaError =
///     ValidationError::new(ValidationErrorKind::UnknownMediaClass("banner".to_string())).into();
/// assert!(!bad.is_retryable());
/// ```
pub trait RetryableError {
    /// Returns true if this error should trigger a retry.
    ///
    /// Timeouts, conflicts with concurrent transactions and in-flight claims are
    /// transient. Validation and not-found errors are permanent.
    fn is_retryable(&self) -> bool;
}
