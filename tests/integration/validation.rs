use std::collections::BTreeMap;

use buildwarden::errors::ErrorCode;
use buildwarden::validation::{
    EnvRequirement, EnvSnapshot, EnvValidator, RequiredEnvValidator, Severity, MISSING_ENV_VAR,
};
use regex::Regex;

#[test]
fn all_present_is_success() {
    let validator = RequiredEnvValidator::names(&["DATABASE_URL", "NEXTAUTH_SECRET"]);
    let env: EnvSnapshot = [("DATABASE_URL", "postgres://db"), ("NEXTAUTH_SECRET", "x")]
        .into_iter()
        .collect();

    let report = validator.validate("web", &env);

    assert!(report.success);
    assert!(report.into_error("web").is_none());
}

#[test]
fn blank_values_count_as_missing() {
    let validator = RequiredEnvValidator::names(&["DATABASE_URL"]);
    let env = EnvSnapshot::default().with("DATABASE_URL", "   ");

    let report = validator.validate("web", &env);

    assert!(!report.success);
    assert_eq!(report.errors[0].code, MISSING_ENV_VAR);
    assert_eq!(report.errors[0].severity, Severity::High);
}

#[test]
fn missing_wins_over_invalid_when_both_occur() {
    let validator = RequiredEnvValidator::new(vec![
        EnvRequirement::present("DATABASE_URL"),
        EnvRequirement::matching("PORT", Regex::new(r"^\d+$").unwrap()),
    ]);
    let env = EnvSnapshot::default().with("PORT", "http");

    let err = validator.validate("api", &env).into_error("api").unwrap();

    assert_eq!(*err.code(), ErrorCode::MissingEnvVars);
    assert_eq!(err.detail("app_type").and_then(|v| v.as_str()), Some("api"));
    assert_eq!(err.detail("errors").and_then(|v| v.as_array()).map(Vec::len), Some(2));
}

#[test]
fn overlay_replaces_ambient_values() {
    let mut overlay = BTreeMap::new();
    overlay.insert("NODE_ENV".to_string(), "production".to_string());

    let env = EnvSnapshot::default()
        .with("NODE_ENV", "development")
        .with("HOME", "/root")
        .merged(&overlay);

    assert_eq!(env.get("NODE_ENV"), Some("production"));
    assert_eq!(env.get("HOME"), Some("/root"));
}
