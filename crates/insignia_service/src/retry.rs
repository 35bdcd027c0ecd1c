//! Bounded retry of transient failures.

use insignia_error::{
    CoordinationError, CoordinationErrorKind, InsigniaError, InsigniaResult, RetryableError,
};
use std::future::Future;
use std::time::Duration;
use tokio_retry2::strategy::{jitter, ExponentialBackoff};
use tokio_retry2::{Retry, RetryError};

/// Exponential backoff with jitter over a fixed number of attempts.
///
/// Only errors whose [`RetryableError::is_retryable`] is true are retried.
/// When the budget runs out the last error is reported as
/// `CoordinationError::Exhausted`; permanent errors pass through untouched.
#[derive(Debug, Clone, PartialEq, Eq, derive_getters::Getters)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    attempts: usize,
    /// Delay before the first retry
    initial_backoff: Duration,
    /// Upper bound on a single delay
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Create a retry policy. At least one attempt is always made.
    pub fn new(attempts: usize, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Run `action` until it succeeds, fails permanently, or the attempts are used up.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut action: F) -> InsigniaResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = InsigniaResult<T>>,
    {
        let initial_ms = u64::try_from(self.initial_backoff.as_millis()).unwrap_or(u64::MAX).max(1);
        let strategy = ExponentialBackoff::from_millis(initial_ms)
            .factor(2)
            .max_delay(self.max_backoff)
            .map(jitter)
            .take(self.attempts - 1);

        let mut attempt = 0usize;
        let result = Retry::spawn(strategy, || {
            attempt += 1;
            let current = attempt;
            let fut = action();
            async move {
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(e) if e.is_retryable() => {
                        tracing::debug!(operation, attempt = current, error = %e, "Transient failure, will retry");
                        Err(RetryError::Transient {
                            err: e,
                            retry_after: None,
                        })
                    }
                    Err(e) => Err(RetryError::Permanent(e)),
                }
            }
        })
        .await;

        result.map_err(|e| exhausted(operation, attempt, e))
    }
}

fn exhausted(operation: &str, attempts: usize, err: InsigniaError) -> InsigniaError {
    if !err.is_retryable() {
        return err;
    }
    tracing::warn!(operation, attempts, error = %err, "Retry budget exhausted");
    CoordinationError::new(CoordinationErrorKind::Exhausted {
        operation: operation.to_string(),
        attempts,
        last_error: err.to_string(),
    })
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use insignia_error::ValidationError;
    use insignia_error::ValidationErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn in_flight() -> InsigniaError {
        CoordinationError::new(CoordinationErrorKind::ClaimInFlight {
            media_class: "font".into(),
            digest: "aa".into(),
        })
        .into()
    }

    fn fast(attempts: usize) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1), Duration::from_millis(2))
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let calls = AtomicUsize::new(0);
        let value = fast(4)
            .run("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(in_flight())
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let err = fast(4)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(
                    ValidationError::new(ValidationErrorKind::UnknownMediaClass("x".into())).into(),
                )
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_is_reported() {
        let calls = AtomicUsize::new(0);
        let err = fast(3)
            .run("store_media", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(in_flight())
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("store_media failed after 3 attempts"));
    }
}
