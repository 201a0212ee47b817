// src/pipeline/mod.rs

//! Build pipeline coordination for one workspace.
//!
//! A [`BuildPipeline`] drives a single [`WorkspacePlan`] through
//!
//! ```text
//! Validating -> Installing -> Building -> Succeeded
//!                                 \-> CleaningUp -> Rebuilding -> Succeeded | Failed
//! ```
//!
//! Commands go through a [`CommandRunner`] and, where retried, through the
//! shared [`Retrier`], so every failed attempt lands in the same error log
//! the report is built from.

pub mod build;
pub mod install;
pub mod outputs;
pub mod version;

pub use outputs::{ExpectedOutputs, OutputValidator};
pub use version::{RuntimeRequirement, RuntimeVersion};

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::StructuredError;
use crate::exec::request::{DEFAULT_KILL_GRACE, DEFAULT_SAMPLE_INTERVAL, DEFAULT_TIMEOUT};
use crate::exec::{CommandOutput, CommandRequest, CommandRunner};
use crate::fs::{FileSystem, RealFileSystem};
use crate::retry::{Classifier, Retrier, RetryPolicy, TransientClassifier};
use crate::validation::{EnvSnapshot, EnvValidator, RequiredEnvValidator};

/// Fully resolved settings for building one workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspacePlan {
    pub name: String,
    /// Passed to the environment validator.
    pub app_type: String,
    pub cwd: PathBuf,
    pub install: String,
    /// Run before the second install strategy.
    pub cache_clean: Option<String>,
    /// Third install strategy, typically without optional components.
    pub install_reduced: Option<String>,
    pub build: String,
    pub clean: Option<String>,
    /// Removed during cleanup; relative paths are resolved against `cwd`.
    pub cache_dirs: Vec<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub required_env: Vec<String>,
    pub expected_outputs: Vec<PathBuf>,
    pub timeout: Duration,
    pub memory_limit_mb: Option<u64>,
    pub sample_interval: Duration,
    pub kill_grace: Duration,
    pub install_policy: RetryPolicy,
    pub build_policy: RetryPolicy,
    pub runtime: Option<RuntimeRequirement>,
}

impl WorkspacePlan {
    pub fn new(name: impl Into<String>, install: impl Into<String>, build: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            app_type: name.clone(),
            name,
            cwd: PathBuf::from("."),
            install: install.into(),
            cache_clean: None,
            install_reduced: None,
            build: build.into(),
            clean: None,
            cache_dirs: Vec::new(),
            env: BTreeMap::new(),
            required_env: Vec::new(),
            expected_outputs: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            memory_limit_mb: None,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            kill_grace: DEFAULT_KILL_GRACE,
            install_policy: RetryPolicy::attempts(3),
            build_policy: RetryPolicy::attempts(2),
            runtime: None,
        }
    }

    /// Request for `command` carrying this workspace's directory, env and
    /// budgets.
    pub fn request(&self, command: &str) -> CommandRequest {
        let mut request = CommandRequest::new(command)
            .current_dir(self.cwd.clone())
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .timeout(self.timeout)
            .sample_interval(self.sample_interval)
            .kill_grace(self.kill_grace);
        if let Some(limit) = self.memory_limit_mb {
            request = request.memory_limit_mb(limit);
        }
        request
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    Validating,
    Installing,
    Building,
    CleaningUp,
    Rebuilding,
    Succeeded,
    Failed,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildStage::Validating => "validating",
            BuildStage::Installing => "installing",
            BuildStage::Building => "building",
            BuildStage::CleaningUp => "cleaning_up",
            BuildStage::Rebuilding => "rebuilding",
            BuildStage::Succeeded => "succeeded",
            BuildStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result of a successful `build_with_monitoring` call.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub stages: Vec<BuildStage>,
    pub output: CommandOutput,
    /// True when the build only succeeded after the cleanup cycle.
    pub rebuilt: bool,
    pub runtime_version: Option<RuntimeVersion>,
    pub elapsed: Duration,
}

pub struct BuildPipeline<R> {
    plan: WorkspacePlan,
    runner: R,
    retrier: Retrier,
    classifier: Arc<dyn Classifier>,
    validator: Arc<dyn EnvValidator>,
    env: EnvSnapshot,
    fs: Arc<dyn FileSystem>,
    outputs: Arc<dyn OutputValidator>,
    runtime_version: Mutex<Option<RuntimeVersion>>,
}

impl<R: CommandRunner> BuildPipeline<R> {
    /// Pipeline with production collaborators: transient classifier,
    /// required-variable validation from the plan, the process environment,
    /// the real filesystem and the plan's expected outputs.
    pub fn new(plan: WorkspacePlan, runner: R) -> Self {
        let validator = RequiredEnvValidator::names(&plan.required_env);
        Self {
            plan,
            runner,
            retrier: Retrier::default(),
            classifier: Arc::new(TransientClassifier::new()),
            validator: Arc::new(validator),
            env: EnvSnapshot::from_process(),
            fs: Arc::new(RealFileSystem),
            outputs: Arc::new(ExpectedOutputs),
            runtime_version: Mutex::new(None),
        }
    }

    pub fn with_retrier(mut self, retrier: Retrier) -> Self {
        self.retrier = retrier;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn EnvValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_env(mut self, env: EnvSnapshot) -> Self {
        self.env = env;
        self
    }

    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_output_validator(mut self, outputs: Arc<dyn OutputValidator>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn plan(&self) -> &WorkspacePlan {
        &self.plan
    }

    pub fn retrier(&self) -> &Retrier {
        &self.retrier
    }

    /// Version reported by the last successful runtime probe.
    pub fn runtime_version(&self) -> Option<RuntimeVersion> {
        *self
            .runtime_version
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, StructuredError> {
        let request = self.plan.request(command);
        self.runner.run(&request, self.retrier.cancel_token()).await
    }
}
