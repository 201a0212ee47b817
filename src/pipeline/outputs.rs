// src/pipeline/outputs.rs

use std::fmt::Debug;

use crate::errors::{ErrorCode, StructuredError};
use crate::fs::FileSystem;
use crate::pipeline::WorkspacePlan;

/// Post-build check run after every successful build.
pub trait OutputValidator: Send + Sync + Debug {
    fn validate(&self, plan: &WorkspacePlan, fs: &dyn FileSystem) -> Result<(), StructuredError>;
}

/// Requires every `expected_outputs` path of the plan to exist under its
/// working directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpectedOutputs;

impl OutputValidator for ExpectedOutputs {
    fn validate(&self, plan: &WorkspacePlan, fs: &dyn FileSystem) -> Result<(), StructuredError> {
        let missing: Vec<String> = plan
            .expected_outputs
            .iter()
            .map(|p| plan.cwd.join(p))
            .filter(|p| !fs.exists(p))
            .map(|p| p.display().to_string())
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        Err(StructuredError::new(
            ErrorCode::BuildOutputInvalid,
            format!(
                "build of '{}' finished but {} expected output(s) are missing",
                plan.name,
                missing.len()
            ),
        )
        .with_detail("workspace", plan.name.as_str())
        .with_detail("missing", missing))
    }
}
