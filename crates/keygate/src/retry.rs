//! Bounded exponential backoff for transport faults.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::RetryConfig;
use crate::error::Result;

/// Retry policy for remote calls.
///
/// Only errors with [`is_retryable`](crate::GatewayError::is_retryable) are
/// retried. Denials, integrity failures and context mismatches are returned
/// on the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// Fewest attempts a policy makes.
    pub const MIN_ATTEMPTS: u32 = 3;
    /// Most attempts a policy makes.
    pub const MAX_ATTEMPTS: u32 = 5;

    /// Create a policy. `max_attempts` is clamped to
    /// [`MIN_ATTEMPTS`](Self::MIN_ATTEMPTS)..=[`MAX_ATTEMPTS`](Self::MAX_ATTEMPTS).
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.clamp(Self::MIN_ATTEMPTS, Self::MAX_ATTEMPTS),
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (1-based), doubling each time.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `call` until it succeeds, fails terminally, or attempts run out.
    ///
    /// Each wait is a suspension point; dropping the returned future stops
    /// further attempts.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = delay.as_millis() as u64,
                        code = err.code().unwrap_or("unknown"),
                        "transient key service fault, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1), Duration::from_millis(4))
    }

    fn throttled() -> GatewayError {
        GatewayError::Transport {
            code: "ThrottlingException",
            message: "slow down".into(),
        }
    }

    #[test]
    fn test_attempts_clamped() {
        assert_eq!(fast(0).max_attempts(), 3);
        assert_eq!(fast(4).max_attempts(), 4);
        assert_eq!(fast(50).max_attempts(), 5);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(50), Duration::from_millis(150));
        assert_eq!(policy.backoff(1), Duration::from_millis(50));
        assert_eq!(policy.backoff(2), Duration::from_millis(100));
        assert_eq!(policy.backoff(3), Duration::from_millis(150));
        assert_eq!(policy.backoff(40), Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let calls = &AtomicU32::new(0);
        let result = fast(4)
            .run("test", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(throttled())
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = fast(3)
            .run("test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(throttled())
            })
            .await;
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_denial_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = fast(5)
            .run("test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::AuthorizationDenied {
                    code: "AccessDeniedException",
                    message: "no".into(),
                })
            })
            .await;
        assert!(matches!(result, Err(GatewayError::AuthorizationDenied { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
