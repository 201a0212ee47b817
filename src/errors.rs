// src/errors.rs

//! Error taxonomy.
//!
//! Two layers live here:
//!
//! - [`StructuredError`]: the value object every supervised operation fails
//!   with. It carries a stable [`ErrorCode`], a human-readable message and an
//!   open-ended `details` map. Once handed out it is never mutated; callers
//!   wrap it or log it.
//! - [`WardenError`]: crate-level error for configuration, IO and glue code,
//!   in the same shape the rest of the binary uses.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Stable symbolic error codes.
///
/// Serialised as their SCREAMING_SNAKE string (e.g. `"COMMAND_TIMEOUT"`).
/// OS / network level codes that arrive from outside (`ETIMEDOUT`,
/// `ECONNRESET`, ...) are carried verbatim in [`ErrorCode::Os`].
///
/// A code is identified by its string form: equality and hashing compare
/// [`ErrorCode::as_str`], and parsing normalises to the most specific
/// variant. `Other("ETIMEDOUT")` therefore equals `Os("ETIMEDOUT")`, and
/// both read back from JSON as `Os`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ErrorCode {
    // process level
    CommandTimeout,
    MemoryLimitExceeded,
    CommandFailed,
    ExecutionError,
    Cancelled,

    // retry exhaustion
    MaxRetriesExceeded,
    DependencyInstallExhausted,
    BuildFailedAfterCleanup,
    BuildOutputInvalid,

    // validation
    MissingEnvVars,
    InvalidEnvVars,
    UnsupportedRuntimeVersion,
    InvalidConfig,

    // resources
    ConnectionTimeout,
    ConnectionTestFailed,
    ConnectionExhausted,

    // handler / process boundary
    FunctionTimeout,
    HandlerError,
    UncaughtPanic,
    TerminationSignal,

    /// OS or network error code such as `ETIMEDOUT`.
    Os(String),
    /// Any other caller-supplied code.
    Other(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::CommandTimeout => "COMMAND_TIMEOUT",
            ErrorCode::MemoryLimitExceeded => "MEMORY_LIMIT_EXCEEDED",
            ErrorCode::CommandFailed => "COMMAND_FAILED",
            ErrorCode::ExecutionError => "EXECUTION_ERROR",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            ErrorCode::DependencyInstallExhausted => "DEPENDENCY_INSTALL_EXHAUSTED",
            ErrorCode::BuildFailedAfterCleanup => "BUILD_FAILED_AFTER_CLEANUP",
            ErrorCode::BuildOutputInvalid => "BUILD_OUTPUT_INVALID",
            ErrorCode::MissingEnvVars => "MISSING_ENV_VARS",
            ErrorCode::InvalidEnvVars => "INVALID_ENV_VARS",
            ErrorCode::UnsupportedRuntimeVersion => "UNSUPPORTED_RUNTIME_VERSION",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::ConnectionTimeout => "CONNECTION_TIMEOUT",
            ErrorCode::ConnectionTestFailed => "CONNECTION_TEST_FAILED",
            ErrorCode::ConnectionExhausted => "DATABASE_CONNECTION_EXHAUSTED",
            ErrorCode::FunctionTimeout => "FUNCTION_TIMEOUT",
            ErrorCode::HandlerError => "HANDLER_ERROR",
            ErrorCode::UncaughtPanic => "UNCAUGHT_PANIC",
            ErrorCode::TerminationSignal => "TERMINATION_SIGNAL",
            ErrorCode::Os(code) | ErrorCode::Other(code) => code,
        }
    }

    /// Codes raised by precondition checks. Never worth retrying.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ErrorCode::MissingEnvVars
                | ErrorCode::InvalidEnvVars
                | ErrorCode::UnsupportedRuntimeVersion
                | ErrorCode::InvalidConfig
        )
    }

    /// Codes that mark the end of a retry/fallback sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ErrorCode::MaxRetriesExceeded
                | ErrorCode::DependencyInstallExhausted
                | ErrorCode::BuildFailedAfterCleanup
                | ErrorCode::ConnectionExhausted
                | ErrorCode::Cancelled
        ) || self.is_validation()
    }
}

impl PartialEq for ErrorCode {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for ErrorCode {}

impl Hash for ErrorCode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        code.as_str().to_string()
    }
}

impl From<String> for ErrorCode {
    fn from(s: String) -> Self {
        let known = match s.as_str() {
            "COMMAND_TIMEOUT" => Some(ErrorCode::CommandTimeout),
            "MEMORY_LIMIT_EXCEEDED" => Some(ErrorCode::MemoryLimitExceeded),
            "COMMAND_FAILED" => Some(ErrorCode::CommandFailed),
            "EXECUTION_ERROR" => Some(ErrorCode::ExecutionError),
            "CANCELLED" => Some(ErrorCode::Cancelled),
            "MAX_RETRIES_EXCEEDED" => Some(ErrorCode::MaxRetriesExceeded),
            "DEPENDENCY_INSTALL_EXHAUSTED" => Some(ErrorCode::DependencyInstallExhausted),
            "BUILD_FAILED_AFTER_CLEANUP" => Some(ErrorCode::BuildFailedAfterCleanup),
            "BUILD_OUTPUT_INVALID" => Some(ErrorCode::BuildOutputInvalid),
            "MISSING_ENV_VARS" => Some(ErrorCode::MissingEnvVars),
            "INVALID_ENV_VARS" => Some(ErrorCode::InvalidEnvVars),
            "UNSUPPORTED_RUNTIME_VERSION" => Some(ErrorCode::UnsupportedRuntimeVersion),
            "INVALID_CONFIG" => Some(ErrorCode::InvalidConfig),
            "CONNECTION_TIMEOUT" => Some(ErrorCode::ConnectionTimeout),
            "CONNECTION_TEST_FAILED" => Some(ErrorCode::ConnectionTestFailed),
            "DATABASE_CONNECTION_EXHAUSTED" => Some(ErrorCode::ConnectionExhausted),
            "FUNCTION_TIMEOUT" => Some(ErrorCode::FunctionTimeout),
            "HANDLER_ERROR" => Some(ErrorCode::HandlerError),
            "UNCAUGHT_PANIC" => Some(ErrorCode::UncaughtPanic),
            "TERMINATION_SIGNAL" => Some(ErrorCode::TerminationSignal),
            _ => None,
        };

        match known {
            Some(code) => code,
            None if looks_like_os_code(&s) => ErrorCode::Os(s),
            None => ErrorCode::Other(s),
        }
    }
}

/// `ETIMEDOUT`, `ECONNRESET`, `ENOTFOUND`, ...
fn looks_like_os_code(s: &str) -> bool {
    s.len() > 1 && s.starts_with('E') && s.chars().all(|c| c.is_ascii_uppercase())
}

impl From<&str> for ErrorCode {
    fn from(s: &str) -> Self {
        ErrorCode::from(s.to_string())
    }
}

/// Structured error shared by every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("[{code}] {message}")]
pub struct StructuredError {
    code: ErrorCode,
    message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    details: BTreeMap<String, Value>,
}

impl StructuredError {
    pub fn new(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    /// Attach a diagnostic detail while the error is still being built.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Attach another structured error as a nested detail.
    pub fn with_cause(self, key: impl Into<String>, cause: &StructuredError) -> Self {
        self.with_detail(key, cause.to_value())
    }

    pub fn code(&self) -> &ErrorCode {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &BTreeMap<String, Value> {
        &self.details
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }

    /// JSON form, used when nesting errors inside other errors' details.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::String(self.to_string()))
    }
}

impl From<std::io::Error> for StructuredError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let code = match err.kind() {
            ErrorKind::TimedOut => ErrorCode::Os("ETIMEDOUT".into()),
            ErrorKind::ConnectionReset => ErrorCode::Os("ECONNRESET".into()),
            ErrorKind::ConnectionRefused => ErrorCode::Os("ECONNREFUSED".into()),
            ErrorKind::ConnectionAborted => ErrorCode::Os("ECONNABORTED".into()),
            ErrorKind::NotFound => ErrorCode::Os("ENOENT".into()),
            ErrorKind::PermissionDenied => ErrorCode::Os("EACCES".into()),
            _ => ErrorCode::ExecutionError,
        };
        StructuredError::new(code, err.to_string())
    }
}

/// Crate-level error for config loading, IO and glue code.
#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Structured(#[from] StructuredError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WardenError {
    /// Flatten into a structured error for reporting.
    pub fn into_structured(self) -> StructuredError {
        match self {
            WardenError::Structured(err) => err,
            WardenError::ConfigError(msg) => StructuredError::new(ErrorCode::InvalidConfig, msg),
            WardenError::TomlError(e) => StructuredError::new(ErrorCode::InvalidConfig, e.to_string()),
            WardenError::IoError(e) => StructuredError::from(e),
            WardenError::Other(e) => StructuredError::new(ErrorCode::ExecutionError, format!("{e:#}")),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WardenError>;
