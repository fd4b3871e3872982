//! Bounded exponential backoff for external calls.
//!
//! Policies are data, not annotations: callers hand [`retry_with_backoff`]
//! a closure producing the operation future, a predicate selecting which
//! errors are worth retrying, and a [`RetryPolicy`]. Everything outside the
//! predicate propagates immediately.

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::error::{BraidQLError, Result};

/// Backoff parameters for a retried operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = `max_retries + 1`).
    pub max_retries:   u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling applied to the exponential delay before jitter.
    pub max_delay:     Duration,
    /// Exponent base; 2.0 unless a caller has a reason otherwise.
    pub base:          f64,
    /// Multiply each delay by `0.5 + U[0,1)` to spread concurrent retries.
    pub jitter:        bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries:   3,
            initial_delay: Duration::from_secs(1),
            max_delay:     Duration::from_secs(60),
            base:          2.0,
            jitter:        true,
        }
    }
}

impl RetryPolicy {
    /// Policy used for model API calls: quick retries, 10s ceiling.
    #[must_use]
    pub fn for_model_calls() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            ..Self::default()
        }
    }

    /// Single-retry policy for pool-rebuild recovery paths.
    #[must_use]
    pub fn single() -> Self {
        Self {
            max_retries: 1,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
            ..Self::default()
        }
    }

    /// Unjittered delay for a given zero-based attempt number.
    ///
    /// The sequence is `min(initial * base^attempt, max_delay)` — it is
    /// non-decreasing and saturates at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.initial_delay.as_secs_f64() * self.base.powi(attempt as i32);
        Duration::from_secs_f64(exp.min(self.max_delay.as_secs_f64()))
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter {
            let factor = 0.5 + rand::random::<f64>();
            Duration::from_secs_f64(delay.as_secs_f64() * factor)
        } else {
            delay
        }
    }
}

/// Run `op` under `policy`, retrying errors selected by `should_retry`.
///
/// Errors rejected by the predicate propagate immediately; the last
/// retryable error is surfaced once `max_retries` is exhausted.
///
/// # Errors
///
/// Returns the operation's error when retries are exhausted or the error
/// is not retryable.
pub async fn retry_with_backoff<T, F, Fut, P>(
    policy: &RetryPolicy,
    should_retry: P,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&BraidQLError) -> bool,
{
    for attempt in 0..=policy.max_retries {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !should_retry(&err) => return Err(err),
            Err(err) => {
                if attempt == policy.max_retries {
                    error!(
                        attempts = policy.max_retries + 1,
                        error = %err,
                        "all retries exhausted"
                    );
                    return Err(err);
                }

                let delay = policy.jittered(policy.delay_for(attempt));
                warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            },
        }
    }

    // The loop always returns; attempt == max_retries exits above.
    unreachable!("retry loop exited without returning")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::TransportKind;

    fn transport_err() -> BraidQLError {
        BraidQLError::transport(TransportKind::Connection, "refused")
    }

    #[test]
    fn test_delay_sequence_monotonic_and_capped() {
        let policy = RetryPolicy {
            max_retries:   8,
            initial_delay: Duration::from_secs(1),
            max_delay:     Duration::from_secs(10),
            base:          2.0,
            jitter:        false,
        };

        let delays: Vec<Duration> = (0..8).map(|a| policy.delay_for(a)).collect();
        for pair in delays.windows(2) {
            assert!(pair[1] >= pair[0], "delays must be non-decreasing");
        }
        assert_eq!(delays[0], Duration::from_secs(1));
        assert_eq!(delays[1], Duration::from_secs(2));
        assert_eq!(delays[7], Duration::from_secs(10), "capped at max_delay");
    }

    #[tokio::test]
    async fn test_success_needs_no_retry() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(
            &RetryPolicy::default(),
            BraidQLError::is_transport,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(7) }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let policy = RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: false,
            ..RetryPolicy::default()
        };
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff(&policy, BraidQLError::is_transport, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(transport_err())
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
        let policy = RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            jitter: false,
            ..RetryPolicy::default()
        };
        let calls = AtomicU32::new(0);

        let result: Result<()> = retry_with_backoff(&policy, BraidQLError::is_transport, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transport_err()) }
        })
        .await;

        assert!(matches!(result, Err(BraidQLError::ModelTransport { .. })));
        // max_retries + 1 total attempts
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_propagates_immediately() {
        let calls = AtomicU32::new(0);

        let result: Result<()> =
            retry_with_backoff(&RetryPolicy::default(), BraidQLError::is_transport, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(BraidQLError::invalid_plan("not an object")) }
            })
            .await;

        assert!(matches!(result, Err(BraidQLError::InvalidPlan { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
