// src/fault.rs

//! Process-level fault boundary.
//!
//! Constructed once in the entry point. Panics and termination signals are
//! turned into a [`StructuredError`] (`UNCAUGHT_PANIC` / `TERMINATION_SIGNAL`)
//! and handed to the registered fatal handlers, at most once per process.
//! Async shutdown hooks (e.g. closing a connection pool) run on the signal
//! path, where an executor is available.

use std::panic::{AssertUnwindSafe, PanicHookInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::errors::{ErrorCode, StructuredError};
use crate::exec::BoxFuture;

/// Upper bound for each async shutdown hook.
pub const SHUTDOWN_HOOK_TIMEOUT: Duration = Duration::from_secs(10);

type FatalHandler = Box<dyn Fn(&StructuredError) + Send + Sync>;
type ShutdownHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Clone, Default)]
pub struct FaultBoundary {
    handlers: Arc<Mutex<Vec<FatalHandler>>>,
    shutdown_hooks: Arc<Mutex<Vec<ShutdownHook>>>,
    fired: Arc<AtomicBool>,
}

impl FaultBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronous handler for fatal failures. Handlers must not
    /// block for long: they may run inside the panic hook.
    pub fn on_fatal(&self, handler: impl Fn(&StructuredError) + Send + Sync + 'static) {
        lock(&self.handlers).push(Box::new(handler));
    }

    /// Register an async hook run once on the signal path.
    pub fn on_shutdown<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        lock(&self.shutdown_hooks).push(Box::new(move || Box::pin(hook())));
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Run the fatal handlers with `err`. Only the first call does anything;
    /// returns whether this call was it.
    pub fn trigger(&self, err: &StructuredError) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }

        error!(code = %err.code(), error = %err, "fatal failure");
        for handler in lock(&self.handlers).iter() {
            // A failing handler must not stop the others.
            if std::panic::catch_unwind(AssertUnwindSafe(|| handler(err))).is_err() {
                warn!("fatal handler panicked");
            }
        }
        true
    }

    /// Trigger the fatal handlers, then run every async shutdown hook.
    pub async fn shutdown(&self, err: &StructuredError) {
        self.trigger(err);

        let hooks = std::mem::take(&mut *lock(&self.shutdown_hooks));
        for hook in hooks {
            if tokio::time::timeout(SHUTDOWN_HOOK_TIMEOUT, hook()).await.is_err() {
                warn!(
                    timeout_ms = SHUTDOWN_HOOK_TIMEOUT.as_millis() as u64,
                    "shutdown hook did not finish in time"
                );
            }
        }
    }

    /// Route panics into the fatal handlers. The previously installed hook
    /// still runs afterwards.
    pub fn install_panic_hook(&self) {
        let boundary = self.clone();
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            boundary.trigger(&panic_error(info));
            previous(info);
        }));
    }

    /// Wait for Ctrl-C or SIGTERM. On a signal: cancel `cancel`, run the
    /// fatal handlers and shutdown hooks, and return the error. Returns
    /// `None` if `cancel` fires first.
    pub async fn watch_signals(&self, cancel: CancellationToken) -> Option<StructuredError> {
        let signal = tokio::select! {
            received = termination_signal() => match received {
                Ok(name) => name,
                Err(e) => {
                    warn!(error = %e, "failed to listen for termination signals");
                    cancel.cancelled().await;
                    return None;
                }
            },
            _ = cancel.cancelled() => return None,
        };

        info!(signal, "termination signal received; shutting down");
        let err = StructuredError::new(
            ErrorCode::TerminationSignal,
            format!("received {signal}"),
        )
        .with_detail("signal", signal);

        cancel.cancel();
        self.shutdown(&err).await;
        Some(err)
    }
}

impl std::fmt::Debug for FaultBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultBoundary")
            .field("handlers", &lock(&self.handlers).len())
            .field("shutdown_hooks", &lock(&self.shutdown_hooks).len())
            .field("fired", &self.has_fired())
            .finish()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn panic_error(info: &PanicHookInfo<'_>) -> StructuredError {
    let payload = info.payload();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic with non-string payload".to_string());

    let mut err = StructuredError::new(ErrorCode::UncaughtPanic, message);
    if let Some(location) = info.location() {
        err = err.with_detail("location", location.to_string());
    }
    err
}

#[cfg(unix)]
async fn termination_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        received = tokio::signal::ctrl_c() => received.map(|_| "SIGINT"),
        _ = term.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn termination_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "ctrl-c")
}
