//! Bounded retry for durable store writes.
//!
//! A store write failure threatens state integrity: the engine must not treat
//! an agent as succeeded unless the durable write also succeeded. Writes are
//! therefore retried a bounded number of times with doubling backoff before
//! the failure escalates to a pipeline-level abort.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::models::StoreRetryConfig;

/// Retry policy for store writes.
#[derive(Debug, Clone)]
pub struct StoreRetryPolicy {
    max_retries: u32,
    initial_backoff: Duration,
}

impl StoreRetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
        }
    }

    pub fn from_config(config: &StoreRetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.initial_backoff_ms),
        )
    }

    /// Execute a store write, retrying on failure. Backoff doubles per
    /// attempt. After the budget is exhausted the error is escalated as
    /// [`PipelineError::StoreWrite`].
    pub async fn execute<F, Fut, T>(&self, label: &str, mut operation: F) -> PipelineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PipelineResult<T>>,
    {
        let mut backoff = self.initial_backoff;
        let mut last_error = None;

        for attempt in 1..=self.max_retries.max(1) {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts = self.max_retries.max(1),
                        error = %err,
                        "store write failed"
                    );
                    last_error = Some(err);
                    if attempt < self.max_retries.max(1) {
                        sleep(backoff).await;
                        backoff = backoff.saturating_mul(2);
                    }
                }
            }
        }

        Err(PipelineError::StoreWrite {
            attempts: self.max_retries.max(1),
            message: last_error.map_or_else(|| "unknown".to_string(), |e| e.to_string()),
        })
    }
}

impl Default for StoreRetryPolicy {
    fn default() -> Self {
        Self::from_config(&StoreRetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let policy = StoreRetryPolicy::new(3, Duration::from_millis(1));
        let result = policy.execute("append", || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let policy = StoreRetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = policy
            .execute("append", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(PipelineError::Database("locked".to_string()))
                    } else {
                        Ok("written")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "written");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_escalates_after_budget() {
        let policy = StoreRetryPolicy::new(2, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: PipelineResult<()> = policy
            .execute("append", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PipelineError::Database("disk full".to_string())) }
            })
            .await;

        match result {
            Err(PipelineError::StoreWrite { attempts, message }) => {
                assert_eq!(attempts, 2);
                assert!(message.contains("disk full"));
            }
            other => panic!("expected StoreWrite, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
