use std::time::Duration;

use buildwarden::config::model::RetrySection;
use buildwarden::config::{parse_duration, ConfigFile};
use buildwarden::errors::WardenError;
use buildwarden::exec::request::DEFAULT_TIMEOUT;
use buildwarden::pipeline::RuntimeVersion;
use buildwarden_test_utils::builders::{ConfigFileBuilder, WorkspaceConfigBuilder};

#[test]
fn workspace_defaults_fill_unset_fields() {
    let cfg = ConfigFileBuilder::new()
        .with_workspace("web", WorkspaceConfigBuilder::new("npm ci", "npm run build").build())
        .build();

    let web = cfg.workspace("web").unwrap();
    assert_eq!(web.timeout, DEFAULT_TIMEOUT);
    assert_eq!(web.memory_limit_mb, None);
    assert_eq!(web.install_policy.max_attempts, 3);
    assert_eq!(web.build_policy.max_attempts, 2);
    assert!(web.runtime.is_none());
    assert!(web.cache_clean.is_none());
}

#[test]
fn workspace_overrides_win_over_defaults() {
    let cfg = ConfigFileBuilder::new()
        .with_default_timeout("20m")
        .with_workspace(
            "api",
            WorkspaceConfigBuilder::new("go mod download", "go build ./...")
                .cwd("services/api")
                .timeout("90s")
                .memory_limit_mb(2048)
                .required_env("DATABASE_URL")
                .build(),
        )
        .with_workspace("web", WorkspaceConfigBuilder::new("npm ci", "npm run build").build())
        .build();

    let api = cfg.workspace("api").unwrap();
    assert_eq!(api.timeout, Duration::from_secs(90));
    assert_eq!(api.memory_limit_mb, Some(2048));
    assert_eq!(api.required_env, vec!["DATABASE_URL"]);

    let web = cfg.workspace("web").unwrap();
    assert_eq!(web.timeout, Duration::from_secs(20 * 60));
    assert_eq!(cfg.workspaces().count(), 2);
}

#[test]
fn runtime_requirement_is_shared_by_all_workspaces() {
    let cfg = ConfigFileBuilder::new()
        .with_runtime("node --version", Some("18.17.0"))
        .with_workspace("a", WorkspaceConfigBuilder::new("npm ci", "npm run build").build())
        .with_workspace("b", WorkspaceConfigBuilder::new("npm ci", "npm run build").build())
        .build();

    for plan in cfg.workspaces() {
        let runtime = plan.runtime.as_ref().unwrap();
        assert_eq!(runtime.version_command, "node --version");
        assert_eq!(runtime.min_version, Some(RuntimeVersion::new(18, 17, 0)));
    }
}

#[test]
fn zero_build_attempts_fail_validation() {
    let raw = ConfigFileBuilder::new()
        .with_retry(RetrySection {
            build_attempts: 0,
            ..RetrySection::default()
        })
        .with_workspace("web", WorkspaceConfigBuilder::new("npm ci", "npm run build").build())
        .raw();

    match ConfigFile::try_from(raw) {
        Err(WardenError::ConfigError(msg)) => {
            assert_eq!(msg, "[retry].build_attempts must be >= 1 (got 0)")
        }
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn empty_optional_commands_are_dropped() {
    let cfg = ConfigFileBuilder::new()
        .with_workspace(
            "web",
            WorkspaceConfigBuilder::new("npm ci", "npm run build")
                .cache_clean("  ")
                .install_reduced("npm ci --omit=optional")
                .clean("")
                .build(),
        )
        .build();

    let web = cfg.workspace("web").unwrap();
    assert_eq!(web.cache_clean, None);
    assert_eq!(web.install_reduced.as_deref(), Some("npm ci --omit=optional"));
    assert_eq!(web.clean, None);
}

#[test]
fn durations_accept_common_units() {
    assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
    assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
    assert_eq!(parse_duration(" 5m "), Ok(Duration::from_secs(300)));
    assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
    assert!(parse_duration("").is_err());
    assert!(parse_duration("30").is_err());
    assert!(parse_duration("1.5s").is_err());
}

#[test]
fn parse_duration_rejects_values_that_overflow() {
    let err = parse_duration("400000000000000000m").unwrap_err();
    assert!(err.contains("too large"), "{err}");
    assert!(parse_duration("18446744073709551615h").is_err());
    assert!(parse_duration("99999999999999999999s").is_err());
    assert_eq!(
        parse_duration("18446744073709551615ms"),
        Ok(Duration::from_millis(u64::MAX))
    );
}
