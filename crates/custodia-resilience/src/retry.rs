//! Exponential-backoff retry helper shared by the batch RPC client
//! (spec.md §4.7) and the quote/blueprint aggregator calls (§4.4).

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Retry policy: `max_retries` additional attempts after the first, with
/// delay doubling from `base_delay` each time. No jitter — the teacher's
/// corpus has no existing jitter pattern to imitate (see DESIGN.md).
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: custodia_core::DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(custodia_core::DEFAULT_BACKOFF_BASE_MS),
        }
    }
}

/// Run `op` until it succeeds, `should_retry` returns false for its error,
/// or `max_retries` attempts are exhausted. Returns the last error on
/// exhaustion.
pub async fn retry_with_backoff<T, E, F, Fut, ShouldRetry>(
    policy: RetryPolicy,
    mut op: F,
    should_retry: ShouldRetry,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    ShouldRetry: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_retries && should_retry(&err) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying after transient failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let result: Result<u32, &str> = retry_with_backoff(
            policy,
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err("rate limited")
                } else {
                    Ok(n)
                }
            },
            |_| true,
        )
        .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_retrying_on_non_retryable_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let result: Result<u32, &str> = retry_with_backoff(
            policy,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("malformed request")
            },
            |e| *e != "malformed request",
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_after_max_retries() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let result: Result<u32, &str> = retry_with_backoff(
            policy,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("rate limited")
            },
            |_| true,
        )
        .await;
        assert!(result.is_err());
        // first attempt + 2 retries = 3 calls total
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
