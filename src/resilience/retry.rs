//! # Retry Executor
//!
//! Fixed-interval retries around a fallible collaborator call. The interval
//! never grows between attempts, and the attempt ceiling is never exceeded.

use crate::error::{IndexerError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retry policy attached to a pipeline stage or to the document sub-workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub retry_interval: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(retry_interval: Duration, max_attempts: u32) -> Result<Self> {
        if max_attempts == 0 {
            return Err(IndexerError::configuration(
                "max_attempts must be at least 1",
            ));
        }
        Ok(Self {
            retry_interval,
            max_attempts,
        })
    }

    /// A single attempt, no waiting
    pub fn no_retry() -> Self {
        Self {
            retry_interval: Duration::ZERO,
            max_attempts: 1,
        }
    }
}

/// Stateless executor applying a [`RetryPolicy`] to an async operation
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor;

impl RetryExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or `policy.max_attempts` attempts have failed.
    ///
    /// The closure receives the 1-based attempt number. Any failure is
    /// surfaced as [`IndexerError::PermanentStage`] wrapping the last error.
    pub async fn execute<F, Fut, T>(
        &self,
        operation: &str,
        policy: &RetryPolicy,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match call(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        retry_in_ms = policy.retry_interval.as_millis() as u64,
                        error = %err,
                        "Operation failed, retrying after fixed interval"
                    );
                    tokio::time::sleep(policy.retry_interval).await;
                    attempt += 1;
                }
                Err(err) => {
                    debug!(
                        operation,
                        attempt,
                        retryable = err.is_retryable(),
                        error = %err,
                        "Operation failed permanently"
                    );
                    return Err(IndexerError::PermanentStage {
                        operation: operation.to_string(),
                        attempts: attempt,
                        source: Box::new(err),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn flaky(failures: u32, calls: Arc<AtomicU32>) -> impl FnMut(u32) -> futures::future::Ready<Result<&'static str>> {
        move |_attempt| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < failures {
                futures::future::ready(Err(IndexerError::transient("stub", "throttled")))
            } else {
                futures::future::ready(Ok("done"))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_final_allowed_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(Duration::from_secs(3), 3).unwrap();

        let result = RetryExecutor::new()
            .execute("stub", &policy, flaky(2, calls.clone()))
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_stops_after_exactly_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(Duration::from_secs(3), 2).unwrap();

        let err = RetryExecutor::new()
            .execute("stub", &policy, flaky(2, calls.clone()))
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match err {
            IndexerError::PermanentStage {
                operation,
                attempts,
                source,
            } => {
                assert_eq!(operation, "stub");
                assert_eq!(attempts, 2);
                assert!(matches!(*source, IndexerError::TransientService { .. }));
            }
            other => panic!("expected permanent stage error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_fixed_interval_between_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(Duration::from_secs(60), 4).unwrap();
        let started = tokio::time::Instant::now();

        RetryExecutor::new()
            .execute("stub", &policy, flaky(3, calls))
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(180));
    }

    #[tokio::test]
    async fn test_non_retryable_errors_fail_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let policy = RetryPolicy::new(Duration::from_millis(1), 5).unwrap();

        let err = RetryExecutor::new()
            .execute("chunk_mapping", &policy, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(IndexerError::OutOfRange {
                        position: 10,
                        total_length: 4,
                    })
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            err,
            IndexerError::PermanentStage { attempts: 1, .. }
        ));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        assert!(RetryPolicy::new(Duration::from_secs(1), 0).is_err());
        assert_eq!(RetryPolicy::no_retry().max_attempts, 1);
    }
}
