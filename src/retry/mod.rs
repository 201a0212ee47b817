// src/retry/mod.rs

//! Retry orchestration.
//!
//! [`Retrier::execute`] runs an operation up to `policy.max_attempts` times.
//! Each failure is recorded in the shared [`ErrorLog`] before the next
//! decision is made:
//!
//! - classifier says no: the original error is returned as-is,
//! - attempts remain: sleep for [`RetryPolicy::delay_for`] and go again,
//! - attempts exhausted: `MAX_RETRIES_EXCEEDED` carrying this call's
//!   attempt history.
//!
//! Attempts within one call are strictly sequential. The backoff sleep races
//! the retrier's cancellation token.

pub mod classify;
pub mod fallback;
pub mod policy;

pub use classify::{Classifier, NeverRetry, TransientClassifier};
pub use fallback::{try_each_until_success, FallbackFailure, FallbackStep};
pub use policy::{backoff_delay, RetryPolicy, MAX_BACKOFF};

use std::future::Future;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{ErrorCode, StructuredError};
use crate::report::{ErrorLog, ErrorLogEntry};

#[derive(Debug, Clone, Default)]
pub struct Retrier {
    log: ErrorLog,
    cancel: CancellationToken,
}

impl Retrier {
    pub fn new(log: ErrorLog, cancel: CancellationToken) -> Self {
        Self { log, cancel }
    }

    pub fn log(&self) -> &ErrorLog {
        &self.log
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn execute<T, F, Fut, C>(
        &self,
        operation: &str,
        policy: &RetryPolicy,
        classifier: &C,
        mut op: F,
    ) -> Result<T, StructuredError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StructuredError>>,
        C: Classifier + ?Sized,
    {
        let max_attempts = policy.effective_attempts();
        let mut history: Vec<ErrorLogEntry> = Vec::new();

        for attempt in 1..=max_attempts {
            if self.cancel.is_cancelled() {
                return Err(cancelled(operation, attempt));
            }

            debug!(operation, attempt, max_attempts, "starting attempt");

            let err = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let retryable = classifier.is_retryable(&err);
            let entry = ErrorLogEntry {
                timestamp: Utc::now(),
                operation: operation.to_string(),
                attempt,
                max_attempts,
                error: err.clone(),
                retryable,
            };
            self.log.record(entry.clone());
            history.push(entry);

            if !retryable {
                warn!(operation, attempt, code = %err.code(), error = %err, "non-retryable failure");
                return Err(err);
            }

            if attempt == max_attempts {
                break;
            }

            let delay = policy.delay_for(attempt);
            warn!(
                operation,
                attempt,
                max_attempts,
                code = %err.code(),
                delay_ms = delay.as_millis() as u64,
                "attempt failed; backing off"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => return Err(cancelled(operation, attempt)),
            }
        }

        let last_error = history
            .last()
            .map(|e| e.error.to_value())
            .unwrap_or_default();

        warn!(operation, max_attempts, "retries exhausted");

        Err(StructuredError::new(
            ErrorCode::MaxRetriesExceeded,
            format!("{operation} failed after {max_attempts} attempts"),
        )
        .with_detail("operation", operation)
        .with_detail("max_attempts", max_attempts)
        .with_detail("attempts", serde_json::to_value(&history).unwrap_or_default())
        .with_detail("last_error", last_error))
    }

    /// Run `op` exactly once. A failure is recorded (as not retryable) and
    /// returned unchanged.
    pub async fn attempt_once<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, StructuredError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, StructuredError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(cancelled(operation, 1));
        }

        let result = op().await;
        if let Err(err) = &result {
            warn!(operation, code = %err.code(), error = %err, "single attempt failed");
            self.record_failure(operation, err);
        }
        result
    }

    /// Record a failure that happened outside `execute`/`attempt_once`,
    /// e.g. a timeout that abandoned the operation.
    pub fn record_failure(&self, operation: &str, err: &StructuredError) {
        self.log.record(ErrorLogEntry {
            timestamp: Utc::now(),
            operation: operation.to_string(),
            attempt: 1,
            max_attempts: 1,
            error: err.clone(),
            retryable: false,
        });
    }
}

fn cancelled(operation: &str, attempt: u32) -> StructuredError {
    StructuredError::new(ErrorCode::Cancelled, format!("{operation} was cancelled"))
        .with_detail("operation", operation)
        .with_detail("attempt", attempt)
}
