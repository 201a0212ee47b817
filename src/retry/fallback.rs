// src/retry/fallback.rs

//! Ordered fallback chains.
//!
//! A chain is a list of steps; each step changes *what* is attempted, not
//! just how often. [`try_each_until_success`] walks the list until one step
//! succeeds and otherwise hands back every failure in order.

use std::future::Future;

use tracing::{info, warn};

use crate::errors::{ErrorCode, StructuredError};

#[derive(Debug, Clone)]
pub struct FallbackStep<S> {
    pub description: String,
    pub step: S,
}

impl<S> FallbackStep<S> {
    pub fn new(description: impl Into<String>, step: S) -> Self {
        Self {
            description: description.into(),
            step,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FallbackFailure {
    pub description: String,
    pub error: StructuredError,
}

/// Run `run` on each step in order until one succeeds.
///
/// A `CANCELLED` failure stops the chain immediately.
pub async fn try_each_until_success<'a, S, T, F, Fut>(
    steps: &'a [FallbackStep<S>],
    mut run: F,
) -> Result<T, Vec<FallbackFailure>>
where
    F: FnMut(&'a FallbackStep<S>) -> Fut,
    Fut: Future<Output = Result<T, StructuredError>>,
{
    let mut failures = Vec::new();

    for (index, step) in steps.iter().enumerate() {
        if index > 0 {
            info!(step = %step.description, "trying fallback");
        }

        match run(step).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                warn!(step = %step.description, code = %error.code(), error = %error, "step failed");
                let cancelled = *error.code() == ErrorCode::Cancelled;
                failures.push(FallbackFailure {
                    description: step.description.clone(),
                    error,
                });
                if cancelled {
                    break;
                }
            }
        }
    }

    Err(failures)
}
