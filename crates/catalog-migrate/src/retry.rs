//! Bounded retry with exponential backoff.
//!
//! All network-shaped operations (page reads, batch writes, purge deletes)
//! share one policy: bounded attempts, exponential backoff with jitter, then
//! give up and let the caller classify the failure.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{MigrateError, Result};

/// Configuration for retry behavior with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first (default: 3).
    pub max_attempts: u32,
    /// Delay before the first retry (default: 500ms).
    pub base_delay: Duration,
    /// Cap on the delay between retries (default: 30s).
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each retry (default: 2.0).
    pub backoff_factor: f64,
    /// Random jitter range as a fraction of the delay (default: 0.1 = ±10%).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Build a policy from attempt count and base delay, keeping the default
    /// backoff shape. Used when constructing from config values.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// Calculate the delay before the retry following `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);

        // 2^31 times the base delay is already absurd; cap the exponent.
        let exp = attempt.min(31) as i32;
        let delay_ms = (base_ms as f64) * self.backoff_factor.powi(exp);
        let delay_ms = delay_ms.min(max_ms as f64);

        let jitter_ms = if self.jitter > 0.0 {
            let range = delay_ms * self.jitter;
            rand::thread_rng().gen_range(-range..=range)
        } else {
            0.0
        };

        Duration::from_millis((delay_ms + jitter_ms).max(0.0) as u64)
    }
}

/// Execute an async operation under a retry policy.
///
/// Retries only errors the library classifies as retryable (transport and IO
/// failures). Structural errors propagate immediately. Returns the final
/// error once attempts are exhausted.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(what, retries = attempt, "operation succeeded after retries");
                }
                return Ok(value);
            }
            Err(e) => {
                attempt += 1;

                if !e.is_retryable() {
                    return Err(e);
                }

                if attempt >= policy.max_attempts {
                    warn!(
                        what,
                        attempts = attempt,
                        error = %e,
                        "operation failed after all retry attempts"
                    );
                    return Err(e);
                }

                let delay = policy.delay_for_attempt(attempt - 1);
                debug!(
                    what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after failure"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
