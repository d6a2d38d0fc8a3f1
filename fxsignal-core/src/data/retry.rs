//! Bounded exponential backoff for upstream calls.

use super::provider::DataError;
use crate::config::DataConfig;
use std::time::Duration;

/// Retry budget shared by every network-facing provider.
///
/// Attempt `n` (1-based, after the first failure) waits
/// `min(base_delay * 2^(n-1), max_delay)`. A rate-limit response asks for a
/// specific wait, which is honoured up to `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &DataConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: Duration::from_millis(cfg.base_backoff_ms),
            max_delay: Duration::from_millis(cfg.max_backoff_ms),
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, retry: u32, last_error: Option<&DataError>) -> Duration {
        if let Some(DataError::RateLimited { retry_after_secs }) = last_error {
            return Duration::from_secs(*retry_after_secs).min(self.max_delay);
        }
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is exhausted. `op` receives the 0-based attempt number.
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T, DataError>
    where
        F: FnMut(u32) -> Result<T, DataError>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay_for(attempt, Some(&e));
                    tracing::warn!(
                        target_call = label,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient failure"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
