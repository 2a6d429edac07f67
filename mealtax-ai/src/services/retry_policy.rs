//! Retry with exponential backoff and jitter for inference calls
//!
//! Kept apart from the HTTP client so the schedule and the retryable-error
//! predicate can be tested without a network.

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Backoff schedule: `min(max_delay, base_delay * 2^attempt) * jitter`
/// with jitter drawn uniformly from `[jitter_min, jitter_max)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_min: f64,
    pub jitter_max: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay: Duration::from_millis(800),
            max_delay: Duration::from_secs(12),
            jitter_min: 0.7,
            jitter_max: 1.3,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// No retries, no waiting
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_min: 1.0,
            jitter_max: 1.0,
        }
    }

    /// Delay before retry number `attempt` (0-based) for a given jitter factor
    pub fn delay_for(&self, attempt: u32, jitter: f64) -> Duration {
        let exp = 2f64.powi(attempt.min(30) as i32);
        let raw = self.base_delay.as_secs_f64() * exp;
        let capped = raw.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64((capped * jitter).max(0.0))
    }

    /// Delay with a random jitter factor
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter_max > self.jitter_min {
            rand::thread_rng().gen_range(self.jitter_min..self.jitter_max)
        } else {
            self.jitter_min
        };
        self.delay_for(attempt, jitter)
    }

    /// Whether a failure on `attempt` (0-based) should be retried
    pub fn should_retry<E: Retryable>(&self, attempt: u32, error: &E) -> bool {
        attempt < self.max_retries && error.is_retryable()
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the retry budget is spent. The last error is returned.
    pub async fn run<T, E, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(operation = operation_name, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if !self.should_retry(attempt, &err) {
                        if err.is_retryable() {
                            tracing::warn!(
                                operation = operation_name,
                                attempts = attempt + 1,
                                error = %err,
                                "Retry budget exhausted"
                            );
                        }
                        return Err(err);
                    }

                    let delay = self.jittered_delay(attempt);
                    tracing::warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, will retry after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
