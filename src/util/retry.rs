//! Retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use crate::error::TetherError;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Policy used for agent backend calls: two retries, 15s apart at first.
    pub fn backend() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(15),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Un-jittered delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
    }

    /// Execute an async operation with retry.
    ///
    /// Only errors whose [`TetherError::is_retryable`] is true are retried;
    /// everything else is returned on the first failure. The operation
    /// always runs at least once.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, TetherError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TetherError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            if attempt >= max_attempts || !error.is_retryable() {
                return Err(error);
            }

            let delay = jittered(self.delay_for(attempt));
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying after error"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Scale `delay` into 75%..125% of itself.
fn jittered(delay: Duration) -> Duration {
    Duration::from_secs_f64(delay.as_secs_f64() * (0.75 + unit_random() * 0.5))
}

/// Uniform-ish value in [0, 1) from the random bits of a v4 UUID.
fn unit_random() -> f64 {
    let bits = uuid::Uuid::new_v4().as_u128() as u64;
    (bits % 10_000) as f64 / 10_000.0
}
