use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use buildwarden::errors::{ErrorCode, StructuredError};
use buildwarden::fault::FaultBoundary;
use buildwarden::pool::{ConnectionPool, PoolOptions};
use buildwarden_test_utils::fake_connection::{CountingFactory, FakeConnection};
use buildwarden_test_utils::init_tracing;
use tokio_util::sync::CancellationToken;

#[test]
fn fatal_handlers_run_once() {
    init_tracing();
    let boundary = FaultBoundary::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        boundary.on_fatal(move |err| seen.lock().unwrap().push(err.code().to_string()));
    }

    let first = StructuredError::new(ErrorCode::TerminationSignal, "received SIGTERM");
    let second = StructuredError::new(ErrorCode::UncaughtPanic, "boom");

    assert!(boundary.trigger(&first));
    assert!(!boundary.trigger(&second));
    assert!(boundary.has_fired());
    assert_eq!(*seen.lock().unwrap(), vec!["TERMINATION_SIGNAL"]);
}

#[test]
fn panicking_handler_does_not_stop_the_others() {
    let boundary = FaultBoundary::new();
    let calls = Arc::new(AtomicUsize::new(0));
    boundary.on_fatal(|_| panic!("report writer exploded"));
    {
        let calls = calls.clone();
        boundary.on_fatal(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
    }

    boundary.trigger(&StructuredError::new(ErrorCode::UncaughtPanic, "boom"));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn shutdown_runs_hooks_and_closes_the_pool() {
    let boundary = FaultBoundary::new();
    let pool: ConnectionPool<FakeConnection> = ConnectionPool::new(PoolOptions::default());
    let factory = CountingFactory::new();
    pool.acquire("db", || factory.connect()).await.unwrap();

    {
        let pool = pool.clone();
        boundary.on_shutdown(move || async move { pool.shutdown().await });
    }

    boundary
        .shutdown(&StructuredError::new(ErrorCode::TerminationSignal, "received SIGINT"))
        .await;

    assert!(boundary.has_fired());
    assert!(factory.connection(0).is_closed());
    assert!(pool.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn stuck_shutdown_hook_is_abandoned() {
    let boundary = FaultBoundary::new();
    let finished = Arc::new(AtomicUsize::new(0));
    boundary.on_shutdown(|| async {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    });
    {
        let finished = finished.clone();
        boundary.on_shutdown(move || async move {
            finished.fetch_add(1, Ordering::SeqCst);
        });
    }

    boundary
        .shutdown(&StructuredError::new(ErrorCode::TerminationSignal, "received SIGTERM"))
        .await;

    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn signal_watcher_returns_none_when_cancelled() {
    let boundary = FaultBoundary::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(boundary.watch_signals(cancel).await.is_none());
    assert!(!boundary.has_fired());
}

#[cfg(unix)]
#[tokio::test]
async fn sigterm_cancels_work_and_runs_shutdown() {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    use tokio::signal::unix::{signal, SignalKind};

    // Keeps SIGTERM handled by tokio for the rest of this process.
    let _listener = signal(SignalKind::terminate()).unwrap();

    let boundary = FaultBoundary::new();
    let hooks = Arc::new(AtomicUsize::new(0));
    {
        let hooks = hooks.clone();
        boundary.on_shutdown(move || async move {
            hooks.fetch_add(1, Ordering::SeqCst);
        });
    }

    let cancel = CancellationToken::new();
    let watcher = {
        let boundary = boundary.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { boundary.watch_signals(cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    kill(Pid::from_raw(std::process::id() as i32), Signal::SIGTERM).unwrap();

    let err = tokio::time::timeout(Duration::from_secs(5), watcher)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(*err.code(), ErrorCode::TerminationSignal);
    assert_eq!(err.detail("signal").and_then(|v| v.as_str()), Some("SIGTERM"));
    assert!(cancel.is_cancelled());
    assert_eq!(hooks.load(Ordering::SeqCst), 1);
}
