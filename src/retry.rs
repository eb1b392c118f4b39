use std::future::Future;
use std::time::Duration;

use rand::Rng as _;

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

/// Bounded exponential backoff with jitter for a single upstream call.
///
/// Once the budget is spent the user is skipped until the next cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// No retries at all; one attempt per call.
    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-indexed).
    ///
    /// `min(base * 2^retry, max) + jitter(0..base)`
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        let capped = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let base_ms = self.base_delay.as_millis() as u64;
        let jitter = if base_ms > 0 {
            rand::thread_rng().gen_range(0..base_ms)
        } else {
            0
        };
        capped + Duration::from_millis(jitter)
    }
}

/// Run `operation` until it succeeds, the classifier says `Abort`, or the
/// retry budget is spent. Returns the first `Ok` or the last error.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    config: &RetryConfig,
    what: &str,
    classifier: C,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let total_attempts = config.max_retries.saturating_add(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => e,
        };
        if attempt >= total_attempts || classifier(&err) == RetryAction::Abort {
            return Err(err);
        }
        let delay = config.delay_for_retry(attempt - 1);
        tracing::warn!(
            attempt,
            total_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying {what}"
        );
        tokio::time::sleep(delay).await;
    }
}
