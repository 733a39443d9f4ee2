//! Retry policy for provider calls.
//!
//! Implements exponential backoff with optional jitter.

use crate::providers::ProviderError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    /// Cap applied to the exponential delay before jitter.
    pub max_delay: Duration,
    pub backoff_base: f64,
    /// Scale every delay by a random factor in [0.5, 1.5].
    pub jitter: bool,
}

impl RetryPolicy {
    /// A policy that never waits between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_base: 1.0,
            jitter: false,
        }
    }

    /// Delay before retry number `retry` (0 for the first retry), without
    /// jitter: `min(max_delay, initial_delay * backoff_base^retry)`.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let delay = self.initial_delay.as_secs_f64() * self.backoff_base.powi(retry as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if self.jitter && !base.is_zero() {
            base.mul_f64(rand::rng().random_range(0.5..=1.5))
        } else {
            base
        }
    }

    /// True when `error` is retryable and another attempt is allowed after
    /// `attempts_made` attempts.
    pub fn should_retry(&self, error: &ProviderError, attempts_made: u32) -> bool {
        error.is_transient() && attempts_made < self.max_attempts
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up. The last error is returned.
    pub async fn run<T, F, Fut>(&self, service: &str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempts_made = 0;
        loop {
            attempts_made += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if self.should_retry(&e, attempts_made) => {
                    let delay = self.delay_for_retry(attempts_made - 1);
                    debug!(
                        "{} attempt {}/{} failed ({}), retrying in {:?}",
                        service, attempts_made, self.max_attempts, e, delay
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!("{} failed after {} attempts: {}", service, attempts_made, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_base: 2.0,
            jitter: true,
        }
    }
}
