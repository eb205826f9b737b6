//! Retry with exponential backoff for transient failures.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::error::Result;

/// How hard to try before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one. 0 behaves like 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// One attempt, no waiting.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            multiplier: 1.0,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.saturating_sub(1) as i32);
        let millis = (self.initial_backoff.as_millis() as f64 * factor).min(u64::MAX as f64);
        Duration::from_millis(millis as u64).min(self.max_backoff)
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
///
/// Only errors whose [`class`](crate::error::SummaryError::class) is transient
/// are retried. The last error is returned unchanged.
///
/// # Errors
///
/// Returns the first permanent error, or the last transient one.
pub fn with_retry<T, F>(policy: &RetryPolicy, op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    op = op_name,
                    attempt,
                    max_attempts,
                    ?delay,
                    error = %err,
                    "Transient failure, retrying"
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorClass, SummaryError};
    use std::cell::Cell;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            multiplier: 2.0,
            max_backoff: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            multiplier: 2.0,
            max_backoff: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
    }

    #[test]
    fn test_transient_then_success() {
        let calls = Cell::new(0);
        let result = with_retry(&fast(3), "fetch", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(SummaryError::upstream("fetch", ErrorClass::Transient, "503"))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_permanent_is_not_retried() {
        let calls = Cell::new(0);
        let result: Result<()> = with_retry(&fast(5), "fetch", || {
            calls.set(calls.get() + 1);
            Err(SummaryError::upstream("fetch", ErrorClass::Permanent, "403"))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<()> = with_retry(&fast(4), "query", || {
            calls.set(calls.get() + 1);
            Err(SummaryError::upstream("query", ErrorClass::Transient, "timeout"))
        });
        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.get(), 4);
    }
}
