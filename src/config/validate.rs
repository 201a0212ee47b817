// src/config/validate.rs

use std::collections::BTreeMap;
use std::time::Duration;

use regex::Regex;

use crate::config::model::{ConfigFile, DefaultsSection, RawConfigFile, RetrySection, RuntimeSection, WorkspaceConfig};
use crate::errors::{Result, WardenError};
use crate::exec::request::{DEFAULT_KILL_GRACE, DEFAULT_SAMPLE_INTERVAL, DEFAULT_TIMEOUT};
use crate::pipeline::{RuntimeRequirement, RuntimeVersion, WorkspacePlan};
use crate::retry::policy::{DEFAULT_BASE_DELAY, DEFAULT_MAX_JITTER};
use crate::retry::{RetryPolicy, MAX_BACKOFF};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = WardenError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_workspaces(&raw)?;
        validate_patterns(&raw.retry.transient_patterns)?;

        let defaults = ResolvedDefaults::from_section(&raw.defaults)?;
        let (install_policy, build_policy) = retry_policies(&raw.retry)?;
        let runtime = runtime_requirement(&raw.runtime)?;

        let mut workspaces = BTreeMap::new();
        for (name, ws) in &raw.workspace {
            let mut plan = resolve_workspace(name, ws, &defaults)?;
            plan.install_policy = install_policy;
            plan.build_policy = build_policy;
            plan.runtime = runtime.clone();
            workspaces.insert(name.clone(), plan);
        }

        Ok(ConfigFile::new_unchecked(
            raw.report,
            raw.retry.transient_patterns,
            workspaces,
        ))
    }
}

/// Parse a duration string like `"500ms"`, `"10s"`, `"5m"` or `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

    let secs_per_unit = match unit_part.trim().to_lowercase().as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        unit => {
            return Err(format!(
                "unsupported duration unit '{unit}'; expected ms, s, m, or h"
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}

fn ensure_has_workspaces(cfg: &RawConfigFile) -> Result<()> {
    if cfg.workspace.is_empty() {
        return Err(WardenError::ConfigError(
            "config must contain at least one [workspace.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_patterns(patterns: &[String]) -> Result<()> {
    for pattern in patterns {
        Regex::new(pattern).map_err(|e| {
            WardenError::ConfigError(format!(
                "[retry].transient_patterns: invalid regex '{pattern}': {e}"
            ))
        })?;
    }
    Ok(())
}

struct ResolvedDefaults {
    timeout: Duration,
    memory_limit_mb: Option<u64>,
    sample_interval: Duration,
    kill_grace: Duration,
}

impl ResolvedDefaults {
    fn from_section(section: &DefaultsSection) -> Result<Self> {
        Ok(Self {
            timeout: duration_field("[defaults].timeout", section.timeout.as_deref(), DEFAULT_TIMEOUT)?,
            memory_limit_mb: section.memory_limit_mb,
            sample_interval: duration_field(
                "[defaults].memory_sample_interval",
                section.memory_sample_interval.as_deref(),
                DEFAULT_SAMPLE_INTERVAL,
            )?,
            kill_grace: duration_field(
                "[defaults].kill_grace",
                section.kill_grace.as_deref(),
                DEFAULT_KILL_GRACE,
            )?,
        })
    }
}

fn duration_field(field: &str, value: Option<&str>, default: Duration) -> Result<Duration> {
    match value {
        None => Ok(default),
        Some(s) => parse_duration(s).map_err(|e| WardenError::ConfigError(format!("{field}: {e}"))),
    }
}

fn retry_policies(section: &RetrySection) -> Result<(RetryPolicy, RetryPolicy)> {
    if section.install_attempts == 0 {
        return Err(WardenError::ConfigError(
            "[retry].install_attempts must be >= 1 (got 0)".to_string(),
        ));
    }
    if section.build_attempts == 0 {
        return Err(WardenError::ConfigError(
            "[retry].build_attempts must be >= 1 (got 0)".to_string(),
        ));
    }

    let base = duration_field("[retry].base_delay", section.base_delay.as_deref(), DEFAULT_BASE_DELAY)?;
    let max_delay = duration_field("[retry].max_delay", section.max_delay.as_deref(), MAX_BACKOFF)?;
    let jitter = duration_field("[retry].max_jitter", section.max_jitter.as_deref(), DEFAULT_MAX_JITTER)?;

    if max_delay > MAX_BACKOFF {
        return Err(WardenError::ConfigError(format!(
            "[retry].max_delay must be at most {}s",
            MAX_BACKOFF.as_secs()
        )));
    }

    let policy = |attempts| {
        RetryPolicy::attempts(attempts)
            .with_base_delay(base)
            .with_max_delay(max_delay)
            .with_max_jitter(jitter)
    };
    Ok((policy(section.install_attempts), policy(section.build_attempts)))
}

fn runtime_requirement(section: &RuntimeSection) -> Result<Option<RuntimeRequirement>> {
    let min_version = section
        .min_version
        .as_deref()
        .map(|v| {
            RuntimeVersion::parse(v).ok_or_else(|| {
                WardenError::ConfigError(format!("[runtime].min_version: invalid version '{v}'"))
            })
        })
        .transpose()?;

    match (&section.version_command, min_version) {
        (Some(cmd), min_version) if !cmd.trim().is_empty() => Ok(Some(RuntimeRequirement {
            version_command: cmd.clone(),
            min_version,
        })),
        (_, Some(_)) => Err(WardenError::ConfigError(
            "[runtime].min_version requires [runtime].version_command".to_string(),
        )),
        _ => Ok(None),
    }
}

fn resolve_workspace(name: &str, ws: &WorkspaceConfig, defaults: &ResolvedDefaults) -> Result<WorkspacePlan> {
    if ws.install.trim().is_empty() {
        return Err(WardenError::ConfigError(format!(
            "workspace '{name}' has an empty `install` command"
        )));
    }
    if ws.build.trim().is_empty() {
        return Err(WardenError::ConfigError(format!(
            "workspace '{name}' has an empty `build` command"
        )));
    }

    let timeout = duration_field(
        &format!("[workspace.{name}].timeout"),
        ws.timeout.as_deref(),
        defaults.timeout,
    )?;

    let mut plan = WorkspacePlan::new(name, ws.install.clone(), ws.build.clone());
    plan.app_type = ws.app_type.clone().unwrap_or_else(|| name.to_string());
    if let Some(cwd) = &ws.cwd {
        plan.cwd = cwd.clone();
    }
    plan.cache_clean = non_empty(&ws.cache_clean);
    plan.install_reduced = non_empty(&ws.install_reduced);
    plan.clean = non_empty(&ws.clean);
    plan.cache_dirs = ws.cache_dirs.clone();
    plan.env = ws.env.clone();
    plan.required_env = ws.required_env.clone();
    plan.expected_outputs = ws.expected_outputs.clone();
    plan.timeout = timeout;
    plan.memory_limit_mb = ws.memory_limit_mb.or(defaults.memory_limit_mb);
    plan.sample_interval = defaults.sample_interval;
    plan.kill_grace = defaults.kill_grace;
    Ok(plan)
}

fn non_empty(cmd: &Option<String>) -> Option<String> {
    cmd.as_ref().filter(|c| !c.trim().is_empty()).cloned()
}
