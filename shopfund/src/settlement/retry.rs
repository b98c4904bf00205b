//! Exponential backoff with jitter for conflicting units of work.

use std::future::Future;
use std::time::Duration;

use super::config::RetryPolicy;
use super::errors::SettlementResult;

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let base = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_backoff.as_secs_f64());

        let jitter_range = capped * self.jitter_factor;
        let jitter = (rand::random::<f64>() - 0.5) * jitter_range * 2.0;

        Duration::from_secs_f64((capped + jitter).max(0.0))
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or `max_attempts` is used up. The last error is returned on exhaustion.
    pub async fn run<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> SettlementResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SettlementResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        log::info!("{operation_name} succeeded on attempt {attempt}/{max_attempts}");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.backoff(attempt - 1);
                    log::warn!(
                        "{operation_name} attempt {attempt}/{max_attempts} failed: {err}, retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        log::warn!("{operation_name} gave up after {attempt} attempts: {err}");
                    }
                    return Err(err);
                }
            }
        }
    }
}
