//! Bounded retry for conditional writes

use crate::{CoreError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Retry policy for writes that may race with other writers
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Calculate backoff duration for the given retry count
    pub fn backoff_duration(&self, retry_count: u32) -> Duration {
        let base = self.initial_backoff.as_millis() as u64;
        let exponential = 2u64.saturating_pow(retry_count);
        let backoff_ms = base
            .saturating_mul(exponential)
            .min(self.max_backoff.as_millis() as u64);
        Duration::from_millis(backoff_ms)
    }

    /// Run `op` until it succeeds, fails with a non-conflict error, runs
    /// out of attempts, or `shutdown` turns true.
    pub async fn run<T, F, Fut>(
        &self,
        what: &str,
        shutdown: &watch::Receiver<bool>,
        op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_if(what, shutdown, CoreError::is_conflict, op).await
    }

    /// Like [`RetryPolicy::run`], retrying every error `retryable` accepts
    pub async fn run_if<T, F, Fut, P>(
        &self,
        what: &str,
        shutdown: &watch::Receiver<bool>,
        retryable: P,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&CoreError) -> bool,
    {
        let mut shutdown = shutdown.clone();
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if *shutdown.borrow() {
                return Err(CoreError::Cancelled);
            }
            attempt += 1;

            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(e) if retryable(&e) => e,
                Err(e) => return Err(e),
            };

            if attempt >= max_attempts {
                return Err(CoreError::RetriesExhausted {
                    attempts: attempt,
                    last_error: error.to_string(),
                });
            }

            let delay = self.backoff_duration(attempt - 1);
            debug!(
                "Retryable failure on {} (attempt {}/{}), retrying in {:?}: {}",
                what, attempt, max_attempts, delay, error
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return Err(CoreError::Cancelled);
                    }
                    if changed.is_err() {
                        // Nobody can signal shutdown any more
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}
