//! Time-bounded I/O.

use insignia_error::{CoordinationError, CoordinationErrorKind, InsigniaResult};
use std::future::Future;
use std::time::Duration;

/// Limits applied to every catalog and filesystem call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_getters::Getters)]
pub struct IoLimits {
    /// Upper bound for a single call
    timeout: Duration,
    /// Age after which a pending claim is considered abandoned by a crashed writer
    claim_stale_after: Duration,
}

impl IoLimits {
    /// Create limits.
    pub fn new(timeout: Duration, claim_stale_after: Duration) -> Self {
        Self {
            timeout,
            claim_stale_after,
        }
    }
}

impl Default for IoLimits {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(300))
    }
}

/// Run `fut` with a deadline, reporting expiry as a coordination timeout.
///
/// # Examples
///
/// ```
/// use insignia_storage::bounded;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() {
/// let slow = async {
///     tokio::time::sleep(Duration::from_secs(60)).await;
///     Ok::<(), insignia_error::InsigniaError>(())
/// };
/// let err = bounded("slow_call", Duration::from_millis(10), slow).await.unwrap_err();
/// assert!(err.to_string().contains("slow_call timed out"));
/// # }
/// ```
pub async fn bounded<T, F>(operation: &'static str, limit: Duration, fut: F) -> InsigniaResult<T>
where
    F: Future<Output = InsigniaResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, millis = limit.as_millis() as u64, "Operation timed out");
            Err(CoordinationError::new(CoordinationErrorKind::Timeout {
                operation: operation.to_string(),
                millis: limit.as_millis() as u64,
            })
            .into())
        }
    }
}
