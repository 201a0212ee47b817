use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use buildwarden::config::model::{RetrySection, RuntimeSection};
use buildwarden::config::{ConfigFile, RawConfigFile, WorkspaceConfig};
use buildwarden::pipeline::WorkspacePlan;
use buildwarden::retry::RetryPolicy;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_workspace(mut self, name: &str, ws: WorkspaceConfig) -> Self {
        self.config.workspace.insert(name.to_string(), ws);
        self
    }

    pub fn with_retry(mut self, retry: RetrySection) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn with_runtime(mut self, version_command: &str, min_version: Option<&str>) -> Self {
        self.config.runtime = RuntimeSection {
            version_command: Some(version_command.to_string()),
            min_version: min_version.map(str::to_string),
        };
        self
    }

    pub fn with_default_timeout(mut self, timeout: &str) -> Self {
        self.config.defaults.timeout = Some(timeout.to_string());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `WorkspaceConfig`.
pub struct WorkspaceConfigBuilder {
    ws: WorkspaceConfig,
}

impl WorkspaceConfigBuilder {
    pub fn new(install: &str, build: &str) -> Self {
        Self {
            ws: WorkspaceConfig {
                cwd: None,
                app_type: None,
                install: install.to_string(),
                cache_clean: None,
                install_reduced: None,
                build: build.to_string(),
                clean: None,
                cache_dirs: Vec::new(),
                env: BTreeMap::new(),
                required_env: Vec::new(),
                expected_outputs: Vec::new(),
                timeout: None,
                memory_limit_mb: None,
            },
        }
    }

    pub fn cwd(mut self, cwd: &str) -> Self {
        self.ws.cwd = Some(PathBuf::from(cwd));
        self
    }

    pub fn cache_clean(mut self, cmd: &str) -> Self {
        self.ws.cache_clean = Some(cmd.to_string());
        self
    }

    pub fn install_reduced(mut self, cmd: &str) -> Self {
        self.ws.install_reduced = Some(cmd.to_string());
        self
    }

    pub fn clean(mut self, cmd: &str) -> Self {
        self.ws.clean = Some(cmd.to_string());
        self
    }

    pub fn required_env(mut self, name: &str) -> Self {
        self.ws.required_env.push(name.to_string());
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.ws.timeout = Some(timeout.to_string());
        self
    }

    pub fn memory_limit_mb(mut self, limit: u64) -> Self {
        self.ws.memory_limit_mb = Some(limit);
        self
    }

    pub fn build(self) -> WorkspaceConfig {
        self.ws
    }
}

/// A plan with fast backoff (10ms base, no jitter) rooted at `cwd`.
pub fn fast_plan(name: &str, install: &str, build: &str, cwd: impl Into<PathBuf>) -> WorkspacePlan {
    let mut plan = WorkspacePlan::new(name, install, build);
    plan.cwd = cwd.into();
    plan.install_policy = fast_policy(3);
    plan.build_policy = fast_policy(2);
    plan
}

pub fn fast_policy(attempts: u32) -> RetryPolicy {
    RetryPolicy::attempts(attempts)
        .with_base_delay(Duration::from_millis(10))
        .with_max_jitter(Duration::ZERO)
}
