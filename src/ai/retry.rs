//! Retry Driver
//!
//! Wraps a single inference call and retries it while the provider throttles.
//!
//! ## Strategy
//!
//! 1. Invoke the call
//! 2. On success, return (noting how many retries it took)
//! 3. On a non rate-limit failure, propagate immediately
//! 4. On a rate-limit failure with attempts left, wait for the provider hint
//!    (plus a safety buffer) or the jittered backoff, then try again
//! 5. On a rate-limit failure at the last attempt, report exhaustion
//!
//! Exhaustion is terminal for one item only; the orchestrator keeps going.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::backoff::BackoffConfig;
use crate::constants::retry as retry_constants;
use crate::types::LlmError;

/// Retry driver tuning
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total invocations are `max_retries + 1`
    pub max_retries: u32,
    pub backoff: BackoffConfig,
    /// Added to provider retry hints
    pub hint_buffer: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: retry_constants::DEFAULT_MAX_RETRIES,
            backoff: BackoffConfig::default(),
            hint_buffer: Duration::from_millis(retry_constants::RETRY_HINT_BUFFER_MS),
        }
    }
}

/// Failure surfaced by [`RetryDriver::execute`]
#[derive(Debug, Clone, Error)]
pub enum RetryError {
    /// Original failure, passed through without retrying
    #[error("{0}")]
    NonRetryable(LlmError),

    /// Still rate limited after every permitted attempt
    #[error("rate limited after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: LlmError },
}

impl RetryError {
    /// The underlying provider error
    pub fn last_error(&self) -> &LlmError {
        match self {
            Self::NonRetryable(err) => err,
            Self::RetriesExhausted { last, .. } => last,
        }
    }
}

/// Successful call result with the number of retries it took
#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub value: T,
    /// Backoff sleeps performed before the success
    pub retries: u32,
}

/// Per-attempt bookkeeping, kept private to the driver
#[derive(Debug)]
struct RetryAttemptRecord {
    attempt: u32,
    last_error: LlmError,
    delay: Duration,
}

/// Rate-limit aware retry loop
#[derive(Debug, Clone, Default)]
pub struct RetryDriver {
    policy: RetryPolicy,
}

impl RetryDriver {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `call` under the retry policy
    pub async fn execute<T, F, Fut>(
        &self,
        context: &str,
        call: F,
    ) -> Result<RetryOutcome<T>, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        self.execute_observed(context, call, |_| {}).await
    }

    /// Run `call`, reporting every rate-limit failure to `on_rate_limit`
    pub async fn execute_observed<T, F, Fut, O>(
        &self,
        context: &str,
        mut call: F,
        mut on_rate_limit: O,
    ) -> Result<RetryOutcome<T>, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
        O: FnMut(&LlmError),
    {
        let max_retries = self.policy.max_retries;
        let mut previous: Option<RetryAttemptRecord> = None;
        let mut attempt = 0;

        loop {
            match call().await {
                Ok(value) => {
                    if let Some(record) = &previous {
                        info!(
                            context,
                            retries = attempt,
                            last_attempt = record.attempt,
                            last_delay_ms = record.delay.as_millis() as u64,
                            last_error = %record.last_error,
                            "Recovered after {} retries",
                            attempt
                        );
                    }
                    return Ok(RetryOutcome {
                        value,
                        retries: attempt,
                    });
                }
                Err(err) if !err.category.is_retryable() => {
                    debug!(context, attempt, error = %err, "Non-retryable failure");
                    return Err(RetryError::NonRetryable(err));
                }
                Err(err) => {
                    on_rate_limit(&err);

                    if attempt == max_retries {
                        warn!(
                            context,
                            attempts = attempt + 1,
                            error = %err,
                            "Rate limited, retries exhausted"
                        );
                        return Err(RetryError::RetriesExhausted {
                            attempts: attempt + 1,
                            last: err,
                        });
                    }

                    let delay = self.delay_for(attempt, &err);
                    warn!(
                        context,
                        attempt = attempt + 1,
                        max_attempts = max_retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        hinted = err.retry_after.is_some(),
                        "Rate limited, backing off"
                    );
                    sleep(delay).await;

                    previous = Some(RetryAttemptRecord {
                        attempt,
                        last_error: err,
                        delay,
                    });
                    attempt += 1;
                }
            }
        }
    }

    /// Provider hint plus buffer when present, otherwise jittered backoff
    fn delay_for(&self, attempt: u32, err: &LlmError) -> Duration {
        match err.retry_after {
            Some(hint) => hint + self.policy.hint_buffer,
            None => self.policy.backoff.delay(attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorCategory;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn driver(max_retries: u32) -> RetryDriver {
        RetryDriver::new(RetryPolicy {
            max_retries,
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_rate_limit_invoked_once() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<RetryOutcome<()>, _> = driver(5)
            .execute("a.ts", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(LlmError::fatal("invalid model"))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match result {
            Err(RetryError::NonRetryable(err)) => assert_eq!(err.category, ErrorCategory::Fatal),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<RetryOutcome<()>, _> = driver(3)
            .execute("a.ts", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(LlmError::new(ErrorCategory::Unknown, "boom"))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(RetryError::NonRetryable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_then_success() {
        let max_retries = 3;
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let outcome = driver(max_retries)
            .execute("b.ts", move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < max_retries {
                    Err(LlmError::rate_limited("429 Too Many Requests"))
                } else {
                    Ok("analysis")
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.value, "analysis");
        assert_eq!(outcome.retries, max_retries);
        assert_eq!(calls.load(Ordering::SeqCst), max_retries + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_rate_limited_exhausts() {
        let max_retries = 2;
        let calls = AtomicU32::new(0);
        let observed = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<RetryOutcome<()>, _> = driver(max_retries)
            .execute_observed(
                "c.ts",
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(LlmError::rate_limited("quota exceeded"))
                },
                |_| {
                    observed.fetch_add(1, Ordering::SeqCst);
                },
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), max_retries + 1);
        assert_eq!(observed.load(Ordering::SeqCst), max_retries + 1);
        match result {
            Err(RetryError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, max_retries + 1);
                assert!(last.category.is_retryable());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_hint_is_preferred() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let start = tokio::time::Instant::now();
        driver(1)
            .execute("d.ts", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(LlmError::rate_limited("slow down").retry_after(Duration::from_secs(7)))
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();

        // 7s hint + 1s buffer, independent of the backoff schedule
        assert_eq!(start.elapsed(), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_used_without_hint() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let start = tokio::time::Instant::now();
        driver(1)
            .execute("e.ts", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(LlmError::rate_limited("slow down"))
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();

        let waited = start.elapsed();
        // attempt 0 with 2s base and ±25% jitter
        assert!(waited >= Duration::from_millis(1500), "{waited:?}");
        assert!(waited <= Duration::from_millis(2500), "{waited:?}");
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<RetryOutcome<()>, _> = driver(0)
            .execute("f.ts", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(LlmError::rate_limited("429"))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(RetryError::RetriesExhausted { attempts: 1, .. })
        ));
    }
}
