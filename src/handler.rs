// src/handler.rs

//! Supervision for short-lived request handlers.
//!
//! Each [`HandlerSupervisor::invoke`] call:
//!
//! 1. generates a correlation id,
//! 2. validates the required environment and short-circuits with
//!    `MISSING_ENV_VARS` / `INVALID_ENV_VARS` before the handler runs,
//! 3. races the (optionally retried) handler against the timeout.
//!
//! A timeout always wins the race. The handler future is dropped at that
//! point; anything it spawned on its own is the caller's to clean up.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{ErrorCode, StructuredError};
use crate::report::ErrorLog;
use crate::retry::{Classifier, Retrier, RetryPolicy, TransientClassifier};
use crate::validation::{EnvSnapshot, EnvValidator, RequiredEnvValidator};

pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HandlerOptions {
    pub app_type: String,
    pub timeout: Duration,
    /// Retry the handler itself; `None` runs it once.
    pub retry: Option<RetryPolicy>,
    pub required_env: Vec<String>,
    /// Omit error details from response bodies.
    pub production: bool,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            app_type: "handler".to_string(),
            timeout: DEFAULT_HANDLER_TIMEOUT,
            retry: None,
            required_env: Vec::new(),
            production: false,
        }
    }
}

/// HTTP-style status class for an error code.
pub fn status_for(code: &ErrorCode) -> u16 {
    match code {
        c if c.is_validation() => 400,
        ErrorCode::FunctionTimeout | ErrorCode::CommandTimeout | ErrorCode::ConnectionTimeout => 504,
        ErrorCode::MemoryLimitExceeded
        | ErrorCode::ConnectionExhausted
        | ErrorCode::MaxRetriesExceeded => 503,
        _ => 500,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, Value>>,
}

/// Response envelope shared by successes and failures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseBody<O> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<O>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub correlation_id: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerResponse<O> {
    pub status: u16,
    pub body: ResponseBody<O>,
}

impl<O> HandlerResponse<O> {
    pub fn is_success(&self) -> bool {
        self.body.success
    }

    pub fn error_code(&self) -> Option<&str> {
        self.body.error.as_ref().map(|e| e.code.as_str())
    }
}

pub struct HandlerSupervisor {
    options: HandlerOptions,
    validator: Arc<dyn EnvValidator>,
    env: EnvSnapshot,
    retrier: Retrier,
    classifier: Arc<dyn Classifier>,
}

impl HandlerSupervisor {
    pub fn new(options: HandlerOptions) -> Self {
        let validator = RequiredEnvValidator::names(&options.required_env);
        Self {
            options,
            validator: Arc::new(validator),
            env: EnvSnapshot::from_process(),
            retrier: Retrier::default(),
            classifier: Arc::new(TransientClassifier::new()),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn EnvValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_env(mut self, env: EnvSnapshot) -> Self {
        self.env = env;
        self
    }

    pub fn with_retrier(mut self, retrier: Retrier) -> Self {
        self.retrier = retrier;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn options(&self) -> &HandlerOptions {
        &self.options
    }

    pub fn log(&self) -> &ErrorLog {
        self.retrier.log()
    }

    pub async fn invoke<I, O, F, Fut>(&self, input: I, handler: F) -> HandlerResponse<O>
    where
        I: Clone,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<O, StructuredError>>,
    {
        let correlation_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let app_type = self.options.app_type.as_str();

        let result = match self.check_env().await {
            Ok(()) => self.run_with_timeout(input, &handler).await,
            Err(e) => Err(e),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(data) => {
                info!(app_type, correlation_id = %correlation_id, duration_ms, "handler succeeded");
                HandlerResponse {
                    status: 200,
                    body: ResponseBody {
                        success: true,
                        data: Some(data),
                        error: None,
                        correlation_id,
                        duration_ms,
                    },
                }
            }
            Err(err) => {
                let status = status_for(err.code());
                warn!(
                    app_type,
                    correlation_id = %correlation_id,
                    code = %err.code(),
                    status,
                    error = %err,
                    "handler failed"
                );
                HandlerResponse {
                    status,
                    body: ResponseBody {
                        success: false,
                        data: None,
                        error: Some(self.error_body(&err)),
                        correlation_id,
                        duration_ms,
                    },
                }
            }
        }
    }

    async fn check_env(&self) -> Result<(), StructuredError> {
        let app_type = &self.options.app_type;
        self.retrier
            .attempt_once("validate-env", || async {
                match self.validator.validate(app_type, &self.env).into_error(app_type) {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            })
            .await
    }

    async fn run_with_timeout<I, O, F, Fut>(&self, input: I, handler: &F) -> Result<O, StructuredError>
    where
        I: Clone,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<O, StructuredError>>,
    {
        let operation = format!("handler:{}", self.options.app_type);
        let execution = async {
            match &self.options.retry {
                Some(policy) => {
                    self.retrier
                        .execute(&operation, policy, &*self.classifier, || handler(input.clone()))
                        .await
                }
                None => self.retrier.attempt_once(&operation, || handler(input)).await,
            }
        };

        let timeout = self.options.timeout;
        match tokio::time::timeout(timeout, execution).await {
            Ok(result) => result,
            Err(_) => {
                let err = StructuredError::new(
                    ErrorCode::FunctionTimeout,
                    format!("{} did not finish within {}ms", self.options.app_type, timeout.as_millis()),
                )
                .with_detail("timeout_ms", timeout.as_millis() as u64);
                self.retrier.record_failure(&operation, &err);
                Err(err)
            }
        }
    }

    fn error_body(&self, err: &StructuredError) -> ErrorBody {
        let details = (!self.options.production && !err.details().is_empty())
            .then(|| err.details().clone());
        ErrorBody {
            code: err.code().to_string(),
            message: err.message().to_string(),
            details,
        }
    }
}
