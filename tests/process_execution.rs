#![cfg(unix)]

use std::time::{Duration, Instant};

use buildwarden::errors::ErrorCode;
use buildwarden::exec::{run_command, CommandRequest};
use buildwarden_test_utils::{init_tracing, within_budget};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn captures_stdout_of_successful_command() {
    init_tracing();
    let out = run_command(&CommandRequest::new("echo hello"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(out.stdout.trim(), "hello");
    assert_eq!(out.exit_code, 0);
}

#[tokio::test]
async fn env_overlay_and_working_directory_are_applied() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("marker.txt"), "present").unwrap();

    let req = CommandRequest::new("printf '%s ' \"$WARDEN_PROBE\"; cat marker.txt")
        .current_dir(dir.path())
        .env("WARDEN_PROBE", "overlay");
    let out = within_budget(run_command(&req, &CancellationToken::new())).await.unwrap();

    assert_eq!(out.stdout, "overlay present");
}

#[tokio::test]
async fn non_zero_exit_reports_code_and_stderr() {
    let req = CommandRequest::new("echo 'npm ERR! missing script: build' >&2; exit 3");
    let err = within_budget(run_command(&req, &CancellationToken::new())).await.unwrap_err();

    assert_eq!(*err.code(), ErrorCode::CommandFailed);
    assert_eq!(err.detail("exit_code").and_then(|v| v.as_i64()), Some(3));
    let stderr = err.detail("stderr").and_then(|v| v.as_str()).unwrap();
    assert!(stderr.contains("missing script"), "stderr: {stderr}");
    assert!(err.message().contains("missing script"));
}

#[tokio::test]
async fn timeout_terminates_the_process_promptly() {
    let req = CommandRequest::new("sleep 5")
        .timeout(Duration::from_millis(200))
        .kill_grace(Duration::from_millis(500));

    let started = Instant::now();
    let err = within_budget(run_command(&req, &CancellationToken::new())).await.unwrap_err();

    assert_eq!(*err.code(), ErrorCode::CommandTimeout);
    assert_eq!(err.detail("timeout_ms").and_then(|v| v.as_u64()), Some(200));
    assert!(
        started.elapsed() < Duration::from_secs(3),
        "took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn timeout_reaches_grandchildren_of_the_shell() {
    // The shell forks `sleep`; killing only the shell would leave it running
    // and keep the output pipe open.
    let req = CommandRequest::new("sleep 5; echo done")
        .timeout(Duration::from_millis(200))
        .kill_grace(Duration::from_millis(200));

    let started = Instant::now();
    let err = within_budget(run_command(&req, &CancellationToken::new())).await.unwrap_err();

    assert_eq!(*err.code(), ErrorCode::CommandTimeout);
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn cancellation_stops_running_command() {
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        }
    });

    let started = Instant::now();
    let err = within_budget(run_command(&CommandRequest::new("sleep 5"), &cancel))
        .await
        .unwrap_err();

    assert_eq!(*err.code(), ErrorCode::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn memory_ceiling_kills_hungry_process() {
    // `tail` buffers an endless line, so its resident set grows without bound.
    let req = CommandRequest::new("head -c 1000000000 /dev/zero | tail")
        .memory_limit_mb(16)
        .sample_interval(Duration::from_millis(50))
        .kill_grace(Duration::from_millis(200))
        .timeout(Duration::from_secs(8));

    let err = within_budget(run_command(&req, &CancellationToken::new())).await.unwrap_err();

    assert_eq!(*err.code(), ErrorCode::MemoryLimitExceeded);
    assert_eq!(err.detail("limit_mb").and_then(|v| v.as_u64()), Some(16));
    assert!(err.detail("rss_mb").and_then(|v| v.as_u64()).unwrap() >= 16);
}
