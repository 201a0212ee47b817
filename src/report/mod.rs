// src/report/mod.rs

//! Post-mortem reporting.
//!
//! [`Reporter::generate_report`] assembles the [`ErrorLog`] and an
//! environment snapshot into a [`BuildReport`] and writes it as pretty JSON
//! under the logs directory. It runs on failure paths, so it never returns
//! an error: write failures are logged and surface as `None`.

pub mod log;

pub use log::{ErrorLog, ErrorLogEntry};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::exec::memory;
use crate::fs::FileSystem;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub timestamp: DateTime<Utc>,
    pub target: String,
    pub total_duration_ms: u64,
    pub error_log: Vec<ErrorLogEntry>,
    pub environment: EnvironmentSnapshot,
    pub report_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub os: String,
    pub os_release: Option<String>,
    pub arch: String,
    pub runtime_version: Option<String>,
    pub pid: u32,
    pub resource_usage: ResourceUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Resident set of the supervisor itself at report time.
    pub rss_bytes: Option<u64>,
}

impl EnvironmentSnapshot {
    pub fn capture(runtime_version: Option<String>) -> Self {
        let pid = std::process::id();
        Self {
            os: std::env::consts::OS.to_string(),
            os_release: os_release(),
            arch: std::env::consts::ARCH.to_string(),
            runtime_version,
            pid,
            resource_usage: ResourceUsage {
                rss_bytes: memory::process_rss_bytes(pid),
            },
        }
    }
}

/// `PRETTY_NAME` from `/etc/os-release` (Linux only, best effort).
fn os_release() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let content = std::fs::read_to_string("/etc/os-release").ok()?;
        content
            .lines()
            .find_map(|line| line.strip_prefix("PRETTY_NAME="))
            .map(|name| name.trim_matches('"').to_string())
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Writes [`BuildReport`]s for one supervisor instance.
#[derive(Debug, Clone)]
pub struct Reporter {
    target: String,
    logs_dir: PathBuf,
    log: ErrorLog,
    fs: Arc<dyn FileSystem>,
    started: Instant,
    runtime_version: Option<String>,
}

impl Reporter {
    pub fn new(
        target: impl Into<String>,
        logs_dir: impl Into<PathBuf>,
        log: ErrorLog,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            target: target.into(),
            logs_dir: logs_dir.into(),
            log,
            fs,
            started: Instant::now(),
            runtime_version: None,
        }
    }

    pub fn with_runtime_version(mut self, version: Option<String>) -> Self {
        self.runtime_version = version;
        self
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// Assemble the report without writing it.
    pub fn build_report(&self) -> BuildReport {
        let timestamp = Utc::now();
        let file_name = format!(
            "build-report-{}-{}.json",
            sanitize(&self.target),
            timestamp.format("%Y%m%dT%H%M%S%.3fZ")
        );

        BuildReport {
            timestamp,
            target: self.target.clone(),
            total_duration_ms: self.started.elapsed().as_millis() as u64,
            error_log: self.log.entries(),
            environment: EnvironmentSnapshot::capture(self.runtime_version.clone()),
            report_path: self.logs_dir.join(file_name),
        }
    }

    /// Write the report artifact and return its path.
    pub fn generate_report(&self) -> Option<PathBuf> {
        let report = self.build_report();

        let json = match serde_json::to_vec_pretty(&report) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "failed to serialise build report");
                return None;
            }
        };

        match self.fs.write(&report.report_path, &json) {
            Ok(()) => {
                info!(
                    path = %report.report_path.display(),
                    entries = report.error_log.len(),
                    "build report written"
                );
                Some(report.report_path)
            }
            Err(e) => {
                error!(
                    path = %report.report_path.display(),
                    error = %format!("{e:#}"),
                    "failed to write build report"
                );
                None
            }
        }
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
