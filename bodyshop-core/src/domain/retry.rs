//! Bounded retry with a per-attempt deadline.
//!
//! Every network-bound call site (connectivity probes, token refresh, invoice
//! loading) goes through [`retry_with_timeout`] instead of its own loop.

use std::{fmt::Display, future::Future, time::Duration};

use tracing::{debug, warn};

/// Errors that can be produced by a timed-out attempt and that know whether
/// another attempt is worth making.
pub trait Retryable: Sized {
    fn timed_out(after: Duration) -> Self;
    fn is_retryable(&self) -> bool;
}

/// How many attempts to make, how long each may take, and how long to wait
/// between them. The delay is fixed.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    timeouts: Vec<Duration>,
    delay: Duration,
}

impl RetryPolicy {
    /// `attempts` tries with the same deadline each.
    pub fn fixed(attempts: u32, delay: Duration, timeout: Duration) -> Self {
        Self {
            timeouts: vec![timeout; attempts.max(1) as usize],
            delay,
        }
    }

    /// One attempt per entry, each with its own deadline.
    pub fn staged(timeouts: Vec<Duration>, delay: Duration) -> Self {
        let timeouts = if timeouts.is_empty() {
            vec![Duration::from_secs(5)]
        } else {
            timeouts
        };
        Self { timeouts, delay }
    }

    pub fn attempts(&self) -> usize {
        self.timeouts.len()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the policy
/// runs out of attempts. Returns the last error in the latter cases.
pub async fn retry_with_timeout<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    E: Retryable + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.timeouts.len();
    let mut last_error = None;

    for (idx, deadline) in policy.timeouts.iter().copied().enumerate() {
        let attempt = idx + 1;

        let error = match tokio::time::timeout(deadline, op()).await {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    debug!(label, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Ok(Err(e)) if !e.is_retryable() => return Err(e),
            Ok(Err(e)) => e,
            Err(_) => E::timed_out(deadline),
        };

        warn!(label, attempt, attempts, error = %error, "attempt failed");
        last_error = Some(error);

        if attempt < attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }

    // `timeouts` is never empty, so at least one error was recorded.
    Err(last_error.unwrap_or_else(|| E::timed_out(Duration::ZERO)))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Timeout(Duration),
        Flaky,
        Fatal,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Retryable for TestError {
        fn timed_out(after: Duration) -> Self {
            Self::Timeout(after)
        }

        fn is_retryable(&self) -> bool {
            !matches!(self, Self::Fatal)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_flaky_attempts() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::fixed(3, Duration::from_secs(1), Duration::from_secs(5));

        let result = retry_with_timeout(&policy, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TestError::Flaky)
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_attempt_budget() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::fixed(2, Duration::from_millis(10), Duration::from_secs(1));

        let result: Result<(), TestError> = retry_with_timeout(&policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError::Flaky) }
        })
        .await;

        assert_eq!(result, Err(TestError::Flaky));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::fixed(5, Duration::from_millis(10), Duration::from_secs(1));

        let result: Result<(), TestError> = retry_with_timeout(&policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError::Fatal) }
        })
        .await;

        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn staged_deadlines_grow_per_attempt() {
        let policy = RetryPolicy::staged(
            vec![Duration::from_secs(1), Duration::from_secs(2)],
            Duration::ZERO,
        );

        let result: Result<(), TestError> = retry_with_timeout(&policy, "test", || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

        assert_eq!(result, Err(TestError::Timeout(Duration::from_secs(2))));
    }

    #[test]
    fn empty_stage_list_still_makes_one_attempt() {
        let policy = RetryPolicy::staged(vec![], Duration::ZERO);
        assert_eq!(policy.attempts(), 1);
        assert_eq!(RetryPolicy::fixed(0, Duration::ZERO, Duration::ZERO).attempts(), 1);
    }
}
