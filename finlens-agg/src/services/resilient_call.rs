//! Resilient Call Wrapper
//!
//! Runs one flaky async operation with a bounded attempt budget and
//! exponential backoff with jitter:
//!
//! `delay(n) = base * 2^(n-1) + jitter`, `jitter ∈ [0, base]`
//!
//! where `n` is the number of the attempt that just failed (1-based). The last
//! error is returned unchanged once the budget is spent. A cancellation token
//! aborts both an in-flight attempt and a pending backoff sleep.

use finlens_common::config::RetryConfig;
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::types::FetchError;

/// Default attempt budget
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Exponent cap keeps `2^n` from overflowing on absurd attempt budgets
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Attempt budget and backoff base for one wrapped call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.base_delay_ms))
    }
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one attempt
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Same base delay, different attempt budget
    pub fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self::new(max_attempts, self.base_delay)
    }

    /// Deterministic part of the delay after failed attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Backoff plus uniform jitter in `[0, base_delay]`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let jitter_ms = if base_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=base_ms)
        };
        self.backoff(attempt)
            .saturating_add(Duration::from_millis(jitter_ms))
    }
}

/// Terminal outcome of a wrapped call that did not succeed
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Budget spent (or error not retryable); carries the last error unchanged
    #[error("{operation} failed after {attempts} attempt(s): {last_error}")]
    Failed {
        operation: String,
        attempts: u32,
        last_error: E,
    },

    /// Cancellation token fired before a result was obtained
    #[error("{operation} cancelled after {attempts} attempt(s)")]
    Cancelled { operation: String, attempts: u32 },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Failed { attempts, .. } | RetryError::Cancelled { attempts, .. } => {
                *attempts
            }
        }
    }

    /// The last underlying error, if the call was not cancelled
    pub fn into_last_error(self) -> Option<E> {
        match self {
            RetryError::Failed { last_error, .. } => Some(last_error),
            RetryError::Cancelled { .. } => None,
        }
    }
}

impl From<RetryError<FetchError>> for FetchError {
    fn from(err: RetryError<FetchError>) -> Self {
        err.into_last_error().unwrap_or(FetchError::Cancelled)
    }
}

/// Retry every error until the budget is spent
pub async fn call_with_retry<T, E, F, Fut>(
    operation_name: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: F,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    call_with_retry_if(operation_name, policy, cancel, operation, |_| true).await
}

/// Retry only errors for which `should_retry` returns true
///
/// A non-retryable error ends the call immediately and is returned as
/// `RetryError::Failed` with the attempts made so far.
pub async fn call_with_retry_if<T, E, F, Fut, P>(
    operation_name: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
    should_retry: P,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled {
                operation: operation_name.to_string(),
                attempts: attempt - 1,
            });
        }

        debug!(
            operation = operation_name,
            attempt,
            max_attempts,
            "Starting attempt"
        );

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(RetryError::Cancelled {
                    operation: operation_name.to_string(),
                    attempts: attempt,
                });
            }
            result = operation() => result,
        };

        let err = match outcome {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if attempt >= max_attempts || !should_retry(&err) {
            error!(
                operation = operation_name,
                attempt,
                max_attempts,
                error = %err,
                "Call failed, giving up"
            );
            return Err(RetryError::Failed {
                operation: operation_name.to_string(),
                attempts: attempt,
                last_error: err,
            });
        }

        let delay = policy.delay_for(attempt);
        warn!(
            operation = operation_name,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Call failed, retrying after backoff"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(RetryError::Cancelled {
                    operation: operation_name.to_string(),
                    attempts: attempt,
                });
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let calls = AtomicU32::new(0);
        let result = call_with_retry("op", &fast_policy(3), &CancellationToken::new(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, FetchError>(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fails_twice_then_succeeds_with_three_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = call_with_retry("op", &fast_policy(3), &CancellationToken::new(), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(FetchError::Network(format!("attempt {n}")))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> =
            call_with_retry("op", &fast_policy(3), &CancellationToken::new(), move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err(FetchError::Network(format!("attempt {n}"))) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts(), 3);
        match err.into_last_error() {
            Some(FetchError::Network(msg)) => assert_eq!(msg, "attempt 3"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = call_with_retry_if(
            "op",
            &fast_policy(5),
            &CancellationToken::new(),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FetchError::NotAvailable("gone".into())) }
            },
            FetchError::is_retryable,
        )
        .await;

        assert!(matches!(result, Err(RetryError::Failed { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_calls() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);

        let result: Result<(), RetryError<FetchError>> =
            call_with_retry("op", &fast_policy(3), &cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 0, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff_sleep() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::new(3, Duration::from_secs(60));
        let trigger = cancel.clone();

        let result: Result<(), _> = call_with_retry("op", &policy, &cancel, move || {
            trigger.cancel();
            async { Err(FetchError::Network("down".into())) }
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Cancelled { attempts: 1, .. }));
        assert!(matches!(FetchError::from(err), FetchError::Cancelled));
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn test_jitter_is_bounded_by_base() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        for attempt in 1..=4 {
            for _ in 0..50 {
                let delay = policy.delay_for(attempt);
                let floor = policy.backoff(attempt);
                assert!(delay >= floor);
                assert!(delay <= floor + policy.base_delay);
            }
        }
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
        let from_config = RetryPolicy::from(&RetryConfig {
            max_attempts: 4,
            base_delay_ms: 250,
        });
        assert_eq!(from_config.max_attempts, 4);
        assert_eq!(from_config.base_delay, Duration::from_millis(250));
    }
}
