// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::pipeline::WorkspacePlan;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [defaults]
/// timeout = "10m"
/// memory_limit_mb = 4096
///
/// [retry]
/// base_delay = "1s"
/// install_attempts = 3
///
/// [runtime]
/// version_command = "node --version"
/// min_version = "18.17"
///
/// [report]
/// logs_dir = "logs"
///
/// [workspace.web]
/// cwd = "apps/web"
/// install = "npm ci"
/// cache_clean = "npm cache clean --force"
/// install_reduced = "npm ci --omit=optional"
/// build = "npm run build"
/// clean = "npm run clean"
/// cache_dirs = [".next/cache"]
/// required_env = ["DATABASE_URL"]
/// expected_outputs = [".next/BUILD_ID"]
/// ```
///
/// Every section except `[workspace.<name>]` is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub defaults: DefaultsSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub runtime: RuntimeSection,

    #[serde(default)]
    pub report: ReportSection,

    /// Keys are workspace (target) names.
    #[serde(default)]
    pub workspace: BTreeMap<String, WorkspaceConfig>,
}

/// `[defaults]`: budgets applied to every workspace command unless the
/// workspace overrides them. Durations are strings like `"500ms"`, `"10s"`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultsSection {
    #[serde(default)]
    pub timeout: Option<String>,

    #[serde(default)]
    pub memory_limit_mb: Option<u64>,

    #[serde(default)]
    pub memory_sample_interval: Option<String>,

    #[serde(default)]
    pub kill_grace: Option<String>,
}

/// `[retry]`
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default)]
    pub base_delay: Option<String>,

    #[serde(default)]
    pub max_delay: Option<String>,

    #[serde(default)]
    pub max_jitter: Option<String>,

    #[serde(default = "default_install_attempts")]
    pub install_attempts: u32,

    #[serde(default = "default_build_attempts")]
    pub build_attempts: u32,

    /// Extra case-insensitive regexes that mark a failure as transient.
    #[serde(default)]
    pub transient_patterns: Vec<String>,
}

fn default_install_attempts() -> u32 {
    3
}

fn default_build_attempts() -> u32 {
    2
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            base_delay: None,
            max_delay: None,
            max_jitter: None,
            install_attempts: default_install_attempts(),
            build_attempts: default_build_attempts(),
            transient_patterns: Vec::new(),
        }
    }
}

/// `[runtime]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeSection {
    /// Command whose output contains the runtime version.
    #[serde(default)]
    pub version_command: Option<String>,

    /// Lowest accepted version; requires `version_command`.
    #[serde(default)]
    pub min_version: Option<String>,
}

/// `[report]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReportSection {
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,

    /// Also write a report after a successful build.
    #[serde(default)]
    pub always: bool,
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            logs_dir: default_logs_dir(),
            always: false,
        }
    }
}

/// `[workspace.<name>]`
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceConfig {
    /// Working directory, relative to the config file's directory.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Passed to environment validation; defaults to the workspace name.
    #[serde(default)]
    pub app_type: Option<String>,

    pub install: String,

    #[serde(default)]
    pub cache_clean: Option<String>,

    #[serde(default)]
    pub install_reduced: Option<String>,

    pub build: String,

    #[serde(default)]
    pub clean: Option<String>,

    #[serde(default)]
    pub cache_dirs: Vec<PathBuf>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub required_env: Vec<String>,

    #[serde(default)]
    pub expected_outputs: Vec<PathBuf>,

    #[serde(default)]
    pub timeout: Option<String>,

    #[serde(default)]
    pub memory_limit_mb: Option<u64>,
}

/// Validated configuration. Built only through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub report: ReportSection,
    pub transient_patterns: Vec<String>,
    workspaces: BTreeMap<String, WorkspacePlan>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        report: ReportSection,
        transient_patterns: Vec<String>,
        workspaces: BTreeMap<String, WorkspacePlan>,
    ) -> Self {
        Self {
            report,
            transient_patterns,
            workspaces,
        }
    }

    pub fn workspace(&self, name: &str) -> Option<&WorkspacePlan> {
        self.workspaces.get(name)
    }

    pub fn workspaces(&self) -> impl Iterator<Item = &WorkspacePlan> {
        self.workspaces.values()
    }

    pub fn workspace_names(&self) -> Vec<&str> {
        self.workspaces.keys().map(String::as_str).collect()
    }
}
