//! Shared retry strategies.
//!
//! Three shapes cover everything the migration engine needs:
//!
//! - [`retry_on_error`] retries a failing operation with a linear or constant
//!   delay and re-raises the final error unchanged once the attempt budget is
//!   spent.
//! - [`retry_on_result`] polls an operation until a predicate over its
//!   *successful* result says it is done (used to wait for remote jobs to
//!   leave the pending state).
//! - [`retry_on_http_error`] is the transient-transport variant built on
//!   `backon`, with a short constant delay.
//!
//! All strategies are stateless: a policy can be shared across call sites and
//! invoked concurrently. Every retry is logged before the sleep.

use std::future::Future;
use std::time::Duration;

use backon::{ConstantBuilder, ExponentialBuilder, Retryable};

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// The same delay before every retry.
    Constant,
    /// `attempt * base_delay` before retry number `attempt`.
    Linear,
}

/// Configuration for a retry loop.
///
/// `max_attempts` counts the initial attempt, so it is always at least 1.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            backoff: Backoff::Linear,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff,
        }
    }

    /// Fixed-interval polling policy, used to wait on remote jobs.
    #[must_use]
    pub fn polling(interval: Duration, max_attempts: u32) -> Self {
        Self::new(max_attempts, interval, Backoff::Constant)
    }

    /// Delay to sleep after attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Constant => self.base_delay,
            Backoff::Linear => self.base_delay.saturating_mul(attempt),
        }
    }
}

/// Retry `operation` on matching errors.
///
/// Errors for which `is_retryable` returns `false` are returned immediately.
/// After `policy.max_attempts` failed attempts the final error is returned
/// unchanged.
pub async fn retry_on_error<T, E, F, Fut, P>(
    policy: RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 1u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && is_retryable(&err) => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Poll `operation` until `is_pending` returns `false` for its result.
///
/// The final result is returned even if it is still pending after the attempt
/// budget is exhausted; the caller decides whether a non-terminal result is
/// an error. Errors from `operation` are not retried here.
pub async fn retry_on_result<T, E, F, Fut, P>(
    policy: RetryPolicy,
    mut operation: F,
    is_pending: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&T) -> bool,
{
    let mut attempt = 1u32;
    loop {
        let value = operation().await?;
        if !is_pending(&value) || attempt >= policy.max_attempts {
            return Ok(value);
        }
        let delay = policy.delay_for(attempt);
        tracing::debug!(
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "result still pending, polling again"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Attempt budget for transient HTTP failures.
pub const HTTP_RETRY_ATTEMPTS: usize = 5;

/// Delay between transient HTTP retries.
pub const HTTP_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Retry `operation` on transient HTTP failures.
///
/// Five attempts with a short constant delay; `is_retryable` decides which
/// errors count as transient (typically 5xx statuses and transport errors).
pub async fn retry_on_http_error<T, E, F, Fut, P>(operation: F, is_retryable: P) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    operation
        .retry(
            ConstantBuilder::default()
                .with_delay(HTTP_RETRY_DELAY)
                .with_max_times(HTTP_RETRY_ATTEMPTS - 1),
        )
        .when(|e| is_retryable(e))
        .notify(|err, dur| {
            tracing::debug!(delay_ms = dur.as_millis() as u64, error = %err, "retrying http call");
        })
        .await
}

/// Default exponential backoff for bulk transfer operations (blob uploads).
///
/// 1 second initial delay, 30 second cap, 5 retries, jitter enabled.
#[must_use]
pub fn transfer_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(30))
        .with_max_times(5)
        .with_jitter()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError(&'static str);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    #[test]
    fn delay_shapes() {
        let linear = RetryPolicy::new(5, Duration::from_secs(2), Backoff::Linear);
        assert_eq!(linear.delay_for(1), Duration::from_secs(2));
        assert_eq!(linear.delay_for(3), Duration::from_secs(6));

        let constant = RetryPolicy::polling(Duration::from_secs(10), 100);
        assert_eq!(constant.delay_for(1), Duration::from_secs(10));
        assert_eq!(constant.delay_for(50), Duration::from_secs(10));
    }

    #[test]
    fn max_attempts_is_floored_at_one() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Backoff::Constant);
        assert_eq!(policy.max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_on_error_exhausts_budget_and_returns_original_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);

        let policy = RetryPolicy::new(5, Duration::from_secs(1), Backoff::Linear);
        let result: Result<(), TestError> = retry_on_error(
            policy,
            || {
                let calls = Arc::clone(&calls_capture);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(TestError("always fails"))
                }
            },
            |_| true,
        )
        .await;

        let err = result.expect_err("budget exhaustion should surface the error");
        assert_eq!(err.0, "always fails");
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_on_error_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);

        let policy = RetryPolicy::default();
        let result = retry_on_error(
            policy,
            || {
                let calls = Arc::clone(&calls_capture);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(TestError("flaky"))
                    } else {
                        Ok(7u32)
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_on_error_does_not_retry_non_matching_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);

        let result: Result<(), TestError> = retry_on_error(
            RetryPolicy::default(),
            || {
                let calls = Arc::clone(&calls_capture);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(TestError("fatal"))
                }
            },
            |_| false,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_on_result_polls_until_terminal() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);

        let policy = RetryPolicy::polling(Duration::from_secs(5), 10);
        let result: Result<&str, TestError> = retry_on_result(
            policy,
            || {
                let calls = Arc::clone(&calls_capture);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                        Ok("pending")
                    } else {
                        Ok("done")
                    }
                }
            },
            |state| *state == "pending",
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_on_result_returns_last_value_when_exhausted() {
        let policy = RetryPolicy::polling(Duration::from_secs(1), 3);
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);

        let result: Result<&str, TestError> = retry_on_result(
            policy,
            || {
                let calls = Arc::clone(&calls_capture);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("pending")
                }
            },
            |state| *state == "pending",
        )
        .await;

        assert_eq!(result.unwrap(), "pending");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_on_http_error_makes_five_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);

        let result: Result<(), TestError> = retry_on_http_error(
            || {
                let calls = Arc::clone(&calls_capture);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(TestError("503"))
                }
            },
            |_| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), HTTP_RETRY_ATTEMPTS as u32);
    }
}
