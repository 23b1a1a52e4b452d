//! Retry with randomized exponential backoff for the HTTP providers.

use crate::config::validate::MAX_BACKOFF_SECS;
use crate::config::LlmConfig;
use crate::errors::LlmError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            backoff_min: Duration::from_secs(5),
            backoff_max: Duration::from_secs(120),
        }
    }
}

/// NaN falls back to `fallback`; anything else is clamped into
/// `[0, MAX_BACKOFF_SECS]`.
fn secs_or(secs: f64, fallback: Duration) -> Duration {
    Duration::try_from_secs_f64(secs.clamp(0.0, MAX_BACKOFF_SECS)).unwrap_or(fallback)
}

impl RetryPolicy {
    pub fn from_config(cfg: &LlmConfig) -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: cfg.max_attempts.max(1),
            backoff_min: secs_or(cfg.backoff_min_secs, defaults.backoff_min),
            backoff_max: secs_or(cfg.backoff_max_secs, defaults.backoff_max),
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_min: Duration::ZERO,
            backoff_max: Duration::ZERO,
        }
    }

    /// Wait before attempt `attempt + 1`. A server-provided `Retry-After` wins
    /// (capped at `backoff_max`); otherwise a uniform draw between
    /// `backoff_min` and `backoff_min * 2^(attempt-1)`, capped at `backoff_max`.
    pub fn backoff_for<R: Rng + ?Sized>(
        &self,
        attempt: u32,
        err: &LlmError,
        rng: &mut R,
    ) -> Duration {
        if let LlmError::RateLimited {
            retry_after: Some(after),
        } = err
        {
            return (*after).min(self.backoff_max);
        }

        let min = self.backoff_min.as_secs_f64();
        let exp = min * 2f64.powi(attempt.saturating_sub(1).min(30) as i32);
        let ceiling = exp.min(self.backoff_max.as_secs_f64());
        let floor = min.min(ceiling);
        let secs = if ceiling > floor {
            rng.gen_range(floor..=ceiling)
        } else {
            ceiling
        };
        Duration::from_secs_f64(secs)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` is reached.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let backoff = self.backoff_for(attempt, &e, &mut rand::thread_rng());
                    warn!(
                        error = %e,
                        request = what,
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying request"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
