// tests/demo_config.rs

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use buildwarden::config::load_and_validate;
use buildwarden::pipeline::RuntimeVersion;
use buildwarden::retry::TransientClassifier;
use buildwarden_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn demo_config_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/Buildwarden.toml")
}

/// Sanity-check that demos/Buildwarden.toml resolves the way its comments describe.
#[test]
fn demo_config_is_parsed_correctly() -> TestResult {
    init_tracing();

    let cfg = load_and_validate(demo_config_path())?;

    assert_eq!(cfg.workspace_names(), vec!["docs", "web"]);
    assert!(!cfg.report.always);

    let web = cfg.workspace("web").expect("workspace web must exist");
    assert_eq!(web.cwd, PathBuf::from("apps/web"));
    assert_eq!(web.timeout, Duration::from_secs(15 * 60));
    assert_eq!(web.memory_limit_mb, Some(4096));
    assert_eq!(web.cache_clean.as_deref(), Some("npm cache clean --force"));
    assert_eq!(web.install_reduced.as_deref(), Some("npm ci --omit=optional --no-audit"));
    assert_eq!(web.required_env, vec!["DATABASE_URL", "NEXTAUTH_SECRET"]);
    assert_eq!(web.env.len(), 2);
    assert_eq!(web.install_policy.max_attempts, 3);
    assert_eq!(web.build_policy.max_attempts, 2);
    assert_eq!(
        web.runtime.as_ref().and_then(|r| r.min_version),
        Some(RuntimeVersion::new(18, 17, 0))
    );

    let docs = cfg.workspace("docs").expect("workspace docs must exist");
    assert_eq!(docs.timeout, Duration::from_secs(5 * 60));
    assert_eq!(docs.memory_limit_mb, Some(2048));
    assert!(docs.cache_clean.is_none());
    assert!(docs.clean.is_none());

    Ok(())
}

/// The demo's extra transient patterns compile into a classifier.
#[test]
fn demo_transient_patterns_compile() -> TestResult {
    let cfg = load_and_validate(demo_config_path())?;
    TransientClassifier::with_patterns(&cfg.transient_patterns)?;
    Ok(())
}
