//! Bounded retry with exponential backoff.
//!
//! Every external call the core makes (store, object storage) is
//! failable and retryable, never fire-and-forget. Version conflicts are
//! retried immediately (the caller re-reads and recomputes); transient
//! store errors back off exponentially with jitter. Validation and
//! authorization errors pass through untouched on the first attempt.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tandem_core::error::{Result, TandemError};

/// Retry policy for one operation boundary.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubled each retry.
    pub base_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(25),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, retry_index: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(retry_index))
            .min(self.max_delay);
        // Full jitter keeps concurrent retriers from re-colliding.
        let jittered = rand::thread_rng().gen_range(0..=exp.as_millis() as u64);
        Duration::from_millis(jittered)
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or
/// exhausts the policy. The last error is surfaced on exhaustion.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < policy.max_attempts => {
                tracing::warn!(attempt, error = %err, "retrying after transient failure");
                // A lost optimistic write retries immediately; a store
                // failure backs off first.
                if matches!(err, TandemError::TransientStore(_)) {
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
