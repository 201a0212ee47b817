// src/validation.rs

//! Environment validation collaborator.
//!
//! The supervisor does not own any configuration schema. It hands an
//! [`EnvSnapshot`] to an [`EnvValidator`] and turns the resulting
//! [`ValidationReport`] into a `MISSING_ENV_VARS` / `INVALID_ENV_VARS`
//! structured error. [`RequiredEnvValidator`] is the small built-in
//! implementation used by the CLI: presence plus an optional format regex.

use std::collections::BTreeMap;
use std::fmt::Debug;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::{ErrorCode, StructuredError};

/// Issue code for a required variable that is absent or empty.
pub const MISSING_ENV_VAR: &str = "MISSING_ENV_VAR";
/// Issue code for a variable that is present but malformed.
pub const INVALID_ENV_VAR: &str = "INVALID_ENV_VAR";

/// Point-in-time copy of environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment. Non-UTF-8 entries are skipped.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Overlay `other` on top of this snapshot.
    pub fn merged(mut self, other: &BTreeMap<String, String>) -> Self {
        for (k, v) in other {
            self.vars.insert(k.clone(), v.clone());
        }
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    pub code: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub success: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub security_issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// Convert a failed report into the structured error the supervisors
    /// raise. Any missing variable makes it `MISSING_ENV_VARS`; otherwise
    /// `INVALID_ENV_VARS`. Returns `None` for a successful report.
    pub fn into_error(self, app_type: &str) -> Option<StructuredError> {
        if self.success && self.errors.is_empty() {
            return None;
        }

        let missing: Vec<&str> = self
            .errors
            .iter()
            .filter(|i| i.code == MISSING_ENV_VAR)
            .map(|i| i.field.as_str())
            .collect();

        let (code, message) = if missing.is_empty() {
            let invalid: Vec<&str> = self.errors.iter().map(|i| i.field.as_str()).collect();
            (
                ErrorCode::InvalidEnvVars,
                format!("invalid environment variables for {app_type}: {}", invalid.join(", ")),
            )
        } else {
            (
                ErrorCode::MissingEnvVars,
                format!("missing environment variables for {app_type}: {}", missing.join(", ")),
            )
        };

        Some(
            StructuredError::new(code, message)
                .with_detail("app_type", app_type)
                .with_detail("errors", json!(self.errors))
                .with_detail("warnings", json!(self.warnings))
                .with_detail("security_issues", json!(self.security_issues)),
        )
    }
}

/// External validation collaborator.
pub trait EnvValidator: Send + Sync + Debug {
    fn validate(&self, app_type: &str, env: &EnvSnapshot) -> ValidationReport;
}

/// One required variable, optionally with a format the value must match.
#[derive(Debug, Clone)]
pub struct EnvRequirement {
    pub name: String,
    pub pattern: Option<Regex>,
}

impl EnvRequirement {
    pub fn present(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: None,
        }
    }

    pub fn matching(name: impl Into<String>, pattern: Regex) -> Self {
        Self {
            name: name.into(),
            pattern: Some(pattern),
        }
    }
}

/// Checks that each required variable is set, non-empty and well-formed.
#[derive(Debug, Clone, Default)]
pub struct RequiredEnvValidator {
    requirements: Vec<EnvRequirement>,
}

impl RequiredEnvValidator {
    pub fn new(requirements: Vec<EnvRequirement>) -> Self {
        Self { requirements }
    }

    pub fn names<S: AsRef<str>>(names: &[S]) -> Self {
        Self::new(names.iter().map(|n| EnvRequirement::present(n.as_ref())).collect())
    }
}

impl EnvValidator for RequiredEnvValidator {
    fn validate(&self, _app_type: &str, env: &EnvSnapshot) -> ValidationReport {
        let mut report = ValidationReport::ok();

        for req in &self.requirements {
            match env.get(&req.name).map(str::trim) {
                None | Some("") => report.errors.push(ValidationIssue {
                    field: req.name.clone(),
                    message: format!("{} is not set", req.name),
                    code: MISSING_ENV_VAR.to_string(),
                    severity: Severity::High,
                }),
                Some(value) => {
                    if let Some(pattern) = &req.pattern {
                        if !pattern.is_match(value) {
                            report.errors.push(ValidationIssue {
                                field: req.name.clone(),
                                message: format!("{} does not match {}", req.name, pattern.as_str()),
                                code: INVALID_ENV_VAR.to_string(),
                                severity: Severity::High,
                            });
                        }
                    }
                }
            }
        }

        report.success = report.errors.is_empty();
        report
    }
}
