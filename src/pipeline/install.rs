// src/pipeline/install.rs

//! Dependency installation with a fallback chain.
//!
//! Strategies, in order, each changing the command rather than just the
//! attempt count:
//!
//! 1. the install command under the retry policy,
//! 2. the cache-clean command followed by one install,
//! 3. one reduced install.
//!
//! Strategies with no configured command are left out of the chain.

use serde_json::json;
use tracing::info;

use crate::errors::{ErrorCode, StructuredError};
use crate::exec::{CommandOutput, CommandRunner};
use crate::pipeline::BuildPipeline;
use crate::retry::{try_each_until_success, FallbackFailure, FallbackStep};

#[derive(Debug, Clone)]
enum InstallStrategy {
    Install,
    CleanCacheThenInstall(String),
    Reduced(String),
}

impl<R: CommandRunner> BuildPipeline<R> {
    pub async fn install_dependencies(&self) -> Result<CommandOutput, StructuredError> {
        let chain = self.install_chain();
        info!(
            workspace = %self.plan.name,
            strategies = chain.len(),
            "installing dependencies"
        );

        try_each_until_success(&chain, |step| self.run_install_strategy(&step.step))
            .await
            .map_err(|failures| self.install_exhausted(failures))
    }

    fn install_chain(&self) -> Vec<FallbackStep<InstallStrategy>> {
        let mut chain = vec![FallbackStep::new(
            format!("install: {}", self.plan.install),
            InstallStrategy::Install,
        )];
        if let Some(clean) = &self.plan.cache_clean {
            chain.push(FallbackStep::new(
                format!("cache clean + install: {clean}"),
                InstallStrategy::CleanCacheThenInstall(clean.clone()),
            ));
        }
        if let Some(reduced) = &self.plan.install_reduced {
            chain.push(FallbackStep::new(
                format!("reduced install: {reduced}"),
                InstallStrategy::Reduced(reduced.clone()),
            ));
        }
        chain
    }

    async fn run_install_strategy(&self, strategy: &InstallStrategy) -> Result<CommandOutput, StructuredError> {
        match strategy {
            InstallStrategy::Install => {
                self.retrier
                    .execute("install", &self.plan.install_policy, &*self.classifier, || {
                        self.run(&self.plan.install)
                    })
                    .await
            }
            InstallStrategy::CleanCacheThenInstall(clean) => {
                self.retrier
                    .attempt_once("install:cache-clean", || async {
                        self.run(clean).await?;
                        self.run(&self.plan.install).await
                    })
                    .await
            }
            InstallStrategy::Reduced(command) => {
                self.retrier
                    .attempt_once("install:reduced", || self.run(command))
                    .await
            }
        }
    }

    fn install_exhausted(&self, failures: Vec<FallbackFailure>) -> StructuredError {
        if let Some(cancelled) = failures
            .iter()
            .find(|f| *f.error.code() == ErrorCode::Cancelled)
        {
            return cancelled.error.clone();
        }

        let summary: Vec<_> = failures
            .iter()
            .map(|f| {
                json!({
                    "strategy": f.description,
                    "code": f.error.code().as_str(),
                    "message": f.error.message(),
                })
            })
            .collect();

        StructuredError::new(
            ErrorCode::DependencyInstallExhausted,
            format!(
                "dependency install for '{}' failed with all {} strategies",
                self.plan.name,
                failures.len()
            ),
        )
        .with_detail("workspace", self.plan.name.as_str())
        .with_detail("failures", summary)
    }
}
