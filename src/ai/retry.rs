//! Retry Controller
//!
//! Exponential backoff with random jitter around any async operation.
//!
//! On failure the controller stops immediately when the attempt budget is spent
//! or the error is classified non-retryable. Otherwise it waits
//! `initial_delay * 2^attempt` plus jitter drawn from `[0, 10%)` of that delay.
//! Sleeping uses the tokio timer, so concurrent retry loops never block each
//! other and paused-clock tests run instantly.

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::constants::retry as retry_constants;
use crate::types::ErrorClassifier;

/// Run `operation` until it succeeds, fails terminally, or `max_retries`
/// retries have been spent. Returns the last error on failure.
pub async fn with_retry<T, E, F, Fut>(
    mut operation: F,
    max_retries: u32,
    initial_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt: u32 = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                let message = err.to_string();
                if ErrorClassifier::is_non_retryable(&message) {
                    debug!(attempt, error = %message, "Non-retryable error, giving up");
                    return Err(err);
                }
                if attempt >= max_retries {
                    warn!(attempt, error = %message, "Retries exhausted");
                    return Err(err);
                }

                let delay = backoff_delay(initial_delay, attempt);
                let wait = delay + random_jitter(delay);
                debug!(
                    attempt,
                    delay_ms = wait.as_millis() as u64,
                    error = %message,
                    "Retrying after backoff"
                );
                sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

/// `initial * 2^attempt`, saturating
pub fn backoff_delay(initial: Duration, attempt: u32) -> Duration {
    initial.saturating_mul(2u32.saturating_pow(attempt))
}

/// Uniform jitter in `[0, JITTER_RATIO * delay)`
fn random_jitter(delay: Duration) -> Duration {
    let max_jitter_ms = (delay.as_millis() as f64 * retry_constants::JITTER_RATIO) as u64;
    if max_jitter_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_jitter_ms))
}

/// Retry settings carried from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: retry_constants::DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(retry_constants::INITIAL_DELAY_MS),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
        }
    }
}

impl RetryPolicy {
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        with_retry(operation, self.max_retries, self.initial_delay).await
    }
}
