// src/exec/request.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default wall-clock budget for one command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default interval between memory samples.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(10);

/// Grace window between SIGTERM and SIGKILL.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Whether the child's stdout/stderr are captured or passed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdioMode {
    #[default]
    Captured,
    Inherited,
}

/// A single command invocation.
///
/// Built once with the consuming builder methods and only read afterwards.
///
/// ```
/// use std::time::Duration;
/// use buildwarden::exec::CommandRequest;
///
/// let req = CommandRequest::new("npm ci")
///     .current_dir("apps/web")
///     .env("NODE_ENV", "production")
///     .timeout(Duration::from_secs(300))
///     .memory_limit_mb(4096);
/// assert_eq!(req.command(), "npm ci");
/// ```
#[derive(Debug, Clone)]
pub struct CommandRequest {
    command: String,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
    timeout: Duration,
    memory_limit_mb: Option<u64>,
    stdio: StdioMode,
    sample_interval: Duration,
    kill_grace: Duration,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            env: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT,
            memory_limit_mb: None,
            stdio: StdioMode::Captured,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    pub fn current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add an environment variable on top of the ambient environment.
    /// A later call with the same key replaces the earlier value.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.env.insert(k.into(), v.into());
        }
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn memory_limit_mb(mut self, limit: u64) -> Self {
        self.memory_limit_mb = Some(limit);
        self
    }

    pub fn stdio(mut self, mode: StdioMode) -> Self {
        self.stdio = mode;
        self
    }

    pub fn sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn env_overlay(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn timeout_duration(&self) -> Duration {
        self.timeout
    }

    pub fn memory_limit(&self) -> Option<u64> {
        self.memory_limit_mb
    }

    pub fn stdio_mode(&self) -> StdioMode {
        self.stdio
    }

    pub fn sample_every(&self) -> Duration {
        self.sample_interval
    }

    pub fn grace(&self) -> Duration {
        self.kill_grace
    }
}

/// Result of a command that exited with status 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub elapsed: Duration,
}
