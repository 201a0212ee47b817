use buildwarden::errors::{ErrorCode, StructuredError};
use buildwarden::retry::{Classifier, NeverRetry, TransientClassifier};
use buildwarden_test_utils::fake_runner::exit_failure;

#[test]
fn network_codes_are_transient() {
    let classifier = TransientClassifier::new();
    for code in ["ETIMEDOUT", "ECONNRESET", "ENOTFOUND", "ECONNREFUSED", "EAI_AGAIN"] {
        let err = StructuredError::new(code, "network call failed");
        assert!(classifier.is_retryable(&err), "{code}");
    }
}

#[test]
fn supervision_timeouts_are_transient() {
    let classifier = TransientClassifier::new();
    assert!(classifier.is_retryable(&StructuredError::new(ErrorCode::CommandTimeout, "slow")));
    assert!(classifier.is_retryable(&StructuredError::new(ErrorCode::MemoryLimitExceeded, "oom")));
}

#[test]
fn transient_text_in_message_or_stderr_counts() {
    let classifier = TransientClassifier::new();

    let by_message = StructuredError::new(ErrorCode::CommandFailed, "503 Service Unavailable");
    assert!(classifier.is_retryable(&by_message));

    let by_stderr = exit_failure("npm ci", "npm ERR! socket hang up");
    assert!(classifier.is_retryable(&by_stderr));
}

#[test]
fn ordinary_build_errors_are_not_transient() {
    let classifier = TransientClassifier::new();
    let err = exit_failure("npm run build", "Type error: Cannot find name 'foo'");
    assert!(!classifier.is_retryable(&err));
}

#[test]
fn terminal_and_validation_codes_never_retry() {
    let classifier = TransientClassifier::new();
    for code in [
        ErrorCode::MissingEnvVars,
        ErrorCode::UnsupportedRuntimeVersion,
        ErrorCode::MaxRetriesExceeded,
        ErrorCode::Cancelled,
    ] {
        let err = StructuredError::new(code.clone(), "connection reset by peer");
        assert!(!classifier.is_retryable(&err), "{code}");
    }
}

#[test]
fn configured_patterns_extend_the_defaults() {
    let classifier =
        TransientClassifier::with_patterns(&["registry .* returned 5\\d\\d".to_string()]).unwrap();
    let err = exit_failure("npm ci", "npm ERR! Registry npmjs returned 502");
    assert!(classifier.is_retryable(&err));

    assert!(TransientClassifier::with_patterns(&["(".to_string()]).is_err());
}

#[test]
fn never_retry_and_closures() {
    let err = StructuredError::new("ETIMEDOUT", "timed out");
    assert!(!NeverRetry.is_retryable(&err));

    let only_timeouts = |e: &StructuredError| e.code().as_str() == "ETIMEDOUT";
    assert!(only_timeouts.is_retryable(&err));
}
