//! Capped exponential backoff for Redis operations.

use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// A retry policy with jittered exponential backoff, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Build a policy from the configured initial/max backoff
    /// (`redis.spec.backoff_initial_ms`/`backoff_max_ms`).
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            multiplier: 2.0,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_millis = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32 - 1);
        let capped_millis = base_millis.min(self.max_delay.as_millis() as f64);

        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        Duration::from_millis((capped_millis * jitter) as u64)
    }

    /// Run `f`, retrying on `Err` up to `max_attempts` times with capped
    /// exponential backoff between attempts.
    pub async fn execute<F, Fut, T, E>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let delay = self.delay_for_attempt(attempt);
                debug!(attempt, ?delay, "retrying redis operation");
                tokio::time::sleep(delay).await;
            }

            match f().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    debug!(attempt = attempt + 1, error = %e, "redis operation attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.expect("at least one attempt is always made"))
    }
}
