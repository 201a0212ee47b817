// src/pipeline/build.rs

use std::time::Instant;

use serde_json::json;
use tracing::{error, info, warn};

use crate::errors::{ErrorCode, StructuredError};
use crate::exec::{CommandOutput, CommandRunner};
use crate::pipeline::{BuildOutcome, BuildPipeline, BuildStage, RuntimeRequirement, RuntimeVersion};

/// Stage history of one build invocation.
struct StageTrail<'a> {
    workspace: &'a str,
    stages: Vec<BuildStage>,
}

impl<'a> StageTrail<'a> {
    fn new(workspace: &'a str) -> Self {
        Self {
            workspace,
            stages: Vec::new(),
        }
    }

    fn enter(&mut self, stage: BuildStage) {
        info!(workspace = self.workspace, %stage, "build stage");
        self.stages.push(stage);
    }

    /// Mark the build failed and attach the stage history to `err`.
    fn fail(&mut self, err: StructuredError) -> StructuredError {
        let failed_in = self.stages.last().copied();
        self.enter(BuildStage::Failed);
        error!(workspace = self.workspace, code = %err.code(), error = %err, "build failed");
        err.with_detail("stages", json!(self.stages))
            .with_detail("failed_stage", json!(failed_in))
    }
}

impl<R: CommandRunner> BuildPipeline<R> {
    /// Validate, install, build, and on build failure run exactly one
    /// cleanup + rebuild cycle.
    pub async fn build_with_monitoring(&self) -> Result<BuildOutcome, StructuredError> {
        let started = Instant::now();
        let mut trail = StageTrail::new(&self.plan.name);

        trail.enter(BuildStage::Validating);
        if let Err(e) = self
            .retrier
            .attempt_once("validate", || self.validate_environment())
            .await
        {
            return Err(trail.fail(e));
        }

        trail.enter(BuildStage::Installing);
        if let Err(e) = self.install_dependencies().await {
            return Err(trail.fail(e));
        }

        trail.enter(BuildStage::Building);
        let first = self
            .retrier
            .execute("build", &self.plan.build_policy, &*self.classifier, || {
                self.run(&self.plan.build)
            })
            .await;

        let (output, rebuilt) = match first {
            Ok(output) => (output, false),
            Err(original) if *original.code() == ErrorCode::Cancelled => {
                return Err(trail.fail(original));
            }
            Err(original) => {
                warn!(
                    workspace = %self.plan.name,
                    code = %original.code(),
                    "build failed; cleaning up before one more attempt"
                );

                trail.enter(BuildStage::CleaningUp);
                let cleanup_failure = self.cleanup().await.err();

                trail.enter(BuildStage::Rebuilding);
                match self
                    .retrier
                    .attempt_once("rebuild", || self.run(&self.plan.build))
                    .await
                {
                    Ok(output) => (output, true),
                    Err(rebuild_error) if *rebuild_error.code() == ErrorCode::Cancelled => {
                        return Err(trail.fail(rebuild_error));
                    }
                    Err(rebuild_error) => {
                        let mut err = StructuredError::new(
                            ErrorCode::BuildFailedAfterCleanup,
                            format!(
                                "build of '{}' failed again after cleanup: {}",
                                self.plan.name,
                                rebuild_error.message()
                            ),
                        )
                        .with_detail("workspace", self.plan.name.as_str())
                        .with_cause("original_error", &original)
                        .with_cause("cleanup_error", &rebuild_error);
                        if let Some(cleanup) = &cleanup_failure {
                            err = err.with_cause("cleanup_step_error", cleanup);
                        }
                        return Err(trail.fail(err));
                    }
                }
            }
        };

        if let Err(e) = self
            .retrier
            .attempt_once("validate-outputs", || async {
                self.outputs.validate(&self.plan, self.fs.as_ref())
            })
            .await
        {
            return Err(trail.fail(e));
        }

        trail.enter(BuildStage::Succeeded);
        let elapsed = started.elapsed();
        info!(
            workspace = %self.plan.name,
            rebuilt,
            elapsed_ms = elapsed.as_millis() as u64,
            "build succeeded"
        );

        Ok(BuildOutcome {
            stages: trail.stages,
            output,
            rebuilt,
            runtime_version: self.runtime_version(),
            elapsed,
        })
    }

    /// Structural preconditions: working directory, runtime version floor,
    /// required environment. Failures here are never retried.
    pub async fn validate_environment(&self) -> Result<(), StructuredError> {
        if !self.fs.is_dir(&self.plan.cwd) {
            return Err(StructuredError::new(
                ErrorCode::InvalidConfig,
                format!(
                    "working directory {} of '{}' is not accessible",
                    self.plan.cwd.display(),
                    self.plan.name
                ),
            )
            .with_detail("workspace", self.plan.name.as_str())
            .with_detail("cwd", self.plan.cwd.display().to_string()));
        }

        if let Some(requirement) = &self.plan.runtime {
            let version = self.check_runtime(requirement).await?;
            *self
                .runtime_version
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(version);
        }

        let env = self.env.clone().merged(&self.plan.env);
        match self.validator.validate(&self.plan.app_type, &env).into_error(&self.plan.app_type) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn check_runtime(&self, requirement: &RuntimeRequirement) -> Result<RuntimeVersion, StructuredError> {
        let unsupported = |message: String| {
            StructuredError::new(ErrorCode::UnsupportedRuntimeVersion, message)
                .with_detail("version_command", requirement.version_command.as_str())
        };

        let output = self.run(&requirement.version_command).await.map_err(|e| {
            unsupported(format!("runtime probe `{}` failed", requirement.version_command))
                .with_cause("cause", &e)
        })?;

        let text = format!("{}\n{}", output.stdout, output.stderr);
        let version = RuntimeVersion::find_in(&text).ok_or_else(|| {
            unsupported(format!(
                "could not read a version from `{}`",
                requirement.version_command
            ))
            .with_detail("output", text.trim())
        })?;

        if let Some(min) = requirement.min_version {
            if version < min {
                return Err(unsupported(format!(
                    "runtime version {version} is below the required {min}"
                ))
                .with_detail("found", version.to_string())
                .with_detail("required", min.to_string()));
            }
        }

        info!(workspace = %self.plan.name, %version, "runtime version ok");
        Ok(version)
    }

    /// Remove cache directories and run the clean command.
    ///
    /// Every step runs even if an earlier one failed; the first failure is
    /// returned for diagnostics only.
    async fn cleanup(&self) -> Result<(), StructuredError> {
        let mut first_failure = None;

        for dir in &self.plan.cache_dirs {
            let path = self.plan.cwd.join(dir);
            match self.fs.remove_dir_all(&path) {
                Ok(()) => info!(path = %path.display(), "removed build cache"),
                Err(e) => {
                    warn!(path = %path.display(), error = %format!("{e:#}"), "failed to remove build cache");
                    first_failure.get_or_insert_with(|| {
                        StructuredError::new(
                            ErrorCode::ExecutionError,
                            format!("failed to remove {}: {e:#}", path.display()),
                        )
                        .with_detail("path", path.display().to_string())
                    });
                }
            }
        }

        if let Some(clean) = &self.plan.clean {
            let result: Result<CommandOutput, StructuredError> =
                self.retrier.attempt_once("clean", || self.run(clean)).await;
            if let Err(e) = result {
                first_failure.get_or_insert(e);
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
