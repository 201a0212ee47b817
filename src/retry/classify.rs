// src/retry/classify.rs

//! Retryability classifiers.
//!
//! Not every failure source produces a structured code, so the default
//! [`TransientClassifier`] looks at both the code and the message text.

use regex::RegexSet;
use serde_json::Value;

use crate::errors::{ErrorCode, StructuredError};

/// Decides whether a failed attempt is worth another try.
pub trait Classifier: Send + Sync {
    fn is_retryable(&self, error: &StructuredError) -> bool;
}

impl<F> Classifier for F
where
    F: Fn(&StructuredError) -> bool + Send + Sync,
{
    fn is_retryable(&self, error: &StructuredError) -> bool {
        self(error)
    }
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl Classifier for NeverRetry {
    fn is_retryable(&self, _error: &StructuredError) -> bool {
        false
    }
}

/// OS / network codes that usually clear up on their own.
pub const TRANSIENT_OS_CODES: &[&str] = &[
    "ETIMEDOUT",
    "ECONNRESET",
    "ENOTFOUND",
    "ECONNREFUSED",
    "ECONNABORTED",
    "EHOSTUNREACH",
    "ENETUNREACH",
    "EPIPE",
    "EAI_AGAIN",
];

/// Lower-case message fragments that indicate a transient fault.
pub const TRANSIENT_MESSAGES: &[&str] = &[
    "network error",
    "network timeout",
    "socket hang up",
    "rate limit",
    "too many requests",
    "service unavailable",
    "temporarily unavailable",
    "connection reset",
    "connection refused",
    "timed out",
    "etimedout",
    "econnreset",
    "enotfound",
    "econnrefused",
    "eai_again",
    "try again",
];

/// Default classifier: known transient codes, then known transient message
/// fragments (case-insensitive), then any extra configured patterns.
///
/// Terminal and validation codes are never retryable, whatever the message
/// says.
#[derive(Debug, Clone, Default)]
pub struct TransientClassifier {
    extra: Option<RegexSet>,
}

impl TransientClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add case-insensitive regexes matched against the message and the
    /// captured stderr.
    pub fn with_patterns(patterns: &[String]) -> Result<Self, regex::Error> {
        if patterns.is_empty() {
            return Ok(Self::default());
        }
        let set = RegexSet::new(patterns.iter().map(|p| format!("(?i){p}")))?;
        Ok(Self { extra: Some(set) })
    }

    fn code_is_transient(code: &ErrorCode) -> bool {
        match code {
            ErrorCode::CommandTimeout
            | ErrorCode::MemoryLimitExceeded
            | ErrorCode::ConnectionTimeout
            | ErrorCode::ConnectionTestFailed
            | ErrorCode::FunctionTimeout => true,
            ErrorCode::Os(c) | ErrorCode::Other(c) => TRANSIENT_OS_CODES.contains(&c.as_str()),
            _ => false,
        }
    }

    fn text_is_transient(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        if TRANSIENT_MESSAGES.iter().any(|m| lower.contains(m)) {
            return true;
        }
        self.extra.as_ref().is_some_and(|set| set.is_match(text))
    }
}

impl Classifier for TransientClassifier {
    fn is_retryable(&self, error: &StructuredError) -> bool {
        let code = error.code();
        if code.is_terminal() {
            return false;
        }
        if Self::code_is_transient(code) {
            return true;
        }
        if self.text_is_transient(error.message()) {
            return true;
        }
        match error.detail("stderr") {
            Some(Value::String(stderr)) => self.text_is_transient(stderr),
            _ => false,
        }
    }
}
