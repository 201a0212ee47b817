// tests/integration/error_handling.rs

use std::io::Write;

use buildwarden::config::load_and_validate;
use buildwarden::errors::{ErrorCode, StructuredError, WardenError};
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

fn expect_config_error(contents: &str) -> String {
    let file = write_config(contents);
    match load_and_validate(file.path()) {
        Err(WardenError::ConfigError(msg)) => msg,
        Err(other) => panic!("expected ConfigError, got {other:?}"),
        Ok(_) => panic!("expected ConfigError, got a valid config"),
    }
}

#[test]
fn config_without_workspaces_is_rejected() {
    let msg = expect_config_error(
        r#"
[defaults]
timeout = "5m"
"#,
    );
    assert!(msg.contains("at least one [workspace.<name>]"), "{msg}");
}

#[test]
fn zero_attempts_are_rejected() {
    let msg = expect_config_error(
        r#"
[retry]
install_attempts = 0

[workspace.web]
install = "npm ci"
build = "npm run build"
"#,
    );
    assert_eq!(msg, "[retry].install_attempts must be >= 1 (got 0)");
}

#[test]
fn max_delay_above_hard_cap_is_rejected() {
    let msg = expect_config_error(
        r#"
[retry]
max_delay = "5m"

[workspace.web]
install = "npm ci"
build = "npm run build"
"#,
    );
    assert!(msg.contains("[retry].max_delay must be at most 60s"), "{msg}");
}

#[test]
fn bad_duration_names_the_field() {
    let msg = expect_config_error(
        r#"
[workspace.web]
install = "npm ci"
build = "npm run build"
timeout = "ten minutes"
"#,
    );
    assert!(msg.starts_with("[workspace.web].timeout"), "{msg}");
}

#[test]
fn unknown_duration_unit_is_rejected() {
    let msg = expect_config_error(
        r#"
[defaults]
kill_grace = "5d"

[workspace.web]
install = "npm ci"
build = "npm run build"
"#,
    );
    assert!(msg.contains("unsupported duration unit 'd'"), "{msg}");
}

#[test]
fn invalid_transient_pattern_is_rejected() {
    let msg = expect_config_error(
        r#"
[retry]
transient_patterns = ["npm ERR! (network"]

[workspace.web]
install = "npm ci"
build = "npm run build"
"#,
    );
    assert!(msg.contains("transient_patterns"), "{msg}");
}

#[test]
fn min_version_requires_a_probe_command() {
    let msg = expect_config_error(
        r#"
[runtime]
min_version = "18.17"

[workspace.web]
install = "npm ci"
build = "npm run build"
"#,
    );
    assert!(msg.contains("requires [runtime].version_command"), "{msg}");
}

#[test]
fn unparseable_min_version_is_rejected() {
    let msg = expect_config_error(
        r#"
[runtime]
version_command = "node --version"
min_version = "lts"

[workspace.web]
install = "npm ci"
build = "npm run build"
"#,
    );
    assert!(msg.contains("invalid version 'lts'"), "{msg}");
}

#[test]
fn empty_build_command_is_rejected() {
    let msg = expect_config_error(
        r#"
[workspace.api]
install = "go mod download"
build = "   "
"#,
    );
    assert_eq!(msg, "workspace 'api' has an empty `build` command");
}

#[test]
fn missing_required_key_is_a_toml_error() {
    let file = write_config(
        r#"
[workspace.web]
build = "npm run build"
"#,
    );
    match load_and_validate(file.path()) {
        Err(WardenError::TomlError(e)) => assert!(e.to_string().contains("install"), "{e}"),
        other => panic!("expected TomlError, got {other:?}"),
    }
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_and_validate(dir.path().join("Buildwarden.toml"));
    assert!(matches!(result, Err(WardenError::IoError(_))));
}

#[test]
fn full_config_resolves_every_workspace() {
    let file = write_config(
        r#"
[defaults]
timeout = "15m"
memory_limit_mb = 4096
memory_sample_interval = "2s"

[retry]
base_delay = "500ms"
max_delay = "30s"
install_attempts = 4
transient_patterns = ["npm ERR! network"]

[runtime]
version_command = "node --version"
min_version = "v18.17"

[report]
logs_dir = "build-logs"
always = true

[workspace.web]
cwd = "apps/web"
install = "npm ci"
cache_clean = "npm cache clean --force"
install_reduced = "npm ci --omit=optional"
build = "npm run build"
clean = ""
cache_dirs = [".next/cache"]
required_env = ["DATABASE_URL", "NEXTAUTH_SECRET"]
expected_outputs = [".next/BUILD_ID"]
env = { NODE_ENV = "production" }

[workspace.docs]
install = "npm ci"
build = "npm run docs"
timeout = "2m"
memory_limit_mb = 1024
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.workspace_names(), vec!["docs", "web"]);
    assert!(cfg.report.always);
    assert_eq!(cfg.report.logs_dir, std::path::PathBuf::from("build-logs"));
    assert_eq!(cfg.transient_patterns, vec!["npm ERR! network"]);

    let web = cfg.workspace("web").unwrap();
    assert_eq!(web.app_type, "web");
    assert_eq!(web.cwd, std::path::PathBuf::from("apps/web"));
    assert_eq!(web.timeout, std::time::Duration::from_secs(15 * 60));
    assert_eq!(web.memory_limit_mb, Some(4096));
    assert_eq!(web.sample_interval, std::time::Duration::from_secs(2));
    assert_eq!(web.clean, None);
    assert_eq!(web.install_policy.max_attempts, 4);
    assert_eq!(web.build_policy.max_attempts, 2);
    assert_eq!(web.install_policy.base_delay, std::time::Duration::from_millis(500));
    assert_eq!(web.install_policy.max_delay, std::time::Duration::from_secs(30));
    assert_eq!(web.env.get("NODE_ENV").map(String::as_str), Some("production"));
    let runtime = web.runtime.as_ref().unwrap();
    assert_eq!(runtime.min_version.unwrap().to_string(), "18.17.0");

    let docs = cfg.workspace("docs").unwrap();
    assert_eq!(docs.timeout, std::time::Duration::from_secs(120));
    assert_eq!(docs.memory_limit_mb, Some(1024));
    assert_eq!(docs.cwd, std::path::PathBuf::from("."));
}

#[test]
fn error_codes_compare_by_their_string_form() {
    assert_eq!(ErrorCode::Other("EFOO".into()), ErrorCode::Os("EFOO".into()));
    assert_eq!(ErrorCode::Other("COMMAND_TIMEOUT".into()), ErrorCode::CommandTimeout);
    assert_ne!(ErrorCode::Other("EFOO".into()), ErrorCode::Other("EBAR".into()));

    let mut seen = std::collections::HashSet::new();
    seen.insert(ErrorCode::Other("EFOO".into()));
    assert!(seen.contains(&ErrorCode::Os("EFOO".into())));
}

#[test]
fn structured_error_survives_a_json_round_trip() {
    let original = StructuredError::new(ErrorCode::Other("EFOO".into()), "odd failure")
        .with_detail("attempt", 2);

    let json = serde_json::to_string(&original).unwrap();
    let restored: StructuredError = serde_json::from_str(&json).unwrap();

    assert_eq!(restored, original);
    assert_eq!(restored.code().as_str(), "EFOO");
    assert!(matches!(restored.code(), ErrorCode::Os(_)));
}
