//! Bounded retry with exponential backoff and jitter.
//!
//! Each attempt races the operation against a timeout; classification
//! via [`Error::retryable`] decides whether a failure consumes another
//! attempt. Exhaustion returns the last error as a value so callers
//! can skip-and-continue.

use std::future::Future;
use std::time::Duration;

use telemetry::metrics;
use tracing::warn;

use feed_core::{Error, Result};

/// Retry tuning for one class of upstream call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Budget per attempt, not for the whole call.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`: `initial * 2^(attempt-1)`
    /// capped at `max_delay`, plus up to 10% random jitter. Jitter is
    /// only ever added so the floor stays at the exponential curve.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = exp.min(self.max_delay);
        let jitter = capped.mul_f64(rand::random::<f64>() * 0.1);
        capped + jitter
    }
}

/// Runs `op` under `policy`, returning the first success or the last
/// failure once attempts are exhausted.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, service: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1u32;
    loop {
        let result = match tokio::time::timeout(policy.attempt_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(policy.attempt_timeout)),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) if err.retryable() && attempt < policy.max_attempts => {
                let delay = policy.backoff_delay(attempt);
                metrics().upstream_retries.inc();
                warn!(
                    service,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying upstream call"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
