use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use buildwarden::errors::{ErrorCode, StructuredError};
use buildwarden::exec::BoxFuture;
use buildwarden::pool::PooledConnection;

/// Shared, inspectable state of one fake connection.
#[derive(Debug)]
pub struct ConnState {
    pub id: usize,
    healthy: AtomicBool,
    closed: AtomicBool,
    fail_close: AtomicBool,
}

impl ConnState {
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct FakeConnection {
    pub state: Arc<ConnState>,
}

impl FakeConnection {
    pub fn id(&self) -> usize {
        self.state.id
    }
}

impl PooledConnection for FakeConnection {
    fn health_check(&self) -> BoxFuture<'_, Result<(), StructuredError>> {
        Box::pin(async move {
            if self.state.healthy.load(Ordering::SeqCst) && !self.state.is_closed() {
                Ok(())
            } else {
                Err(StructuredError::new(
                    ErrorCode::ConnectionTestFailed,
                    format!("connection {} is unhealthy", self.state.id),
                ))
            }
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), StructuredError>> {
        Box::pin(async move {
            self.state.closed.store(true, Ordering::SeqCst);
            if self.state.fail_close.load(Ordering::SeqCst) {
                return Err(StructuredError::new("ECONNRESET", "close failed"));
            }
            Ok(())
        })
    }
}

/// Connection factory that counts how many connections it created.
///
/// - `failing_first(n)` makes the first `n` connect attempts fail with
///   `ECONNREFUSED`.
/// - `with_delay(d)` makes every connect take `d` (useful to overlap
///   concurrent acquires, or to trip the connect timeout).
/// - `unhealthy_on_arrival()` hands out connections that fail their first
///   health check.
#[derive(Debug, Clone, Default)]
pub struct CountingFactory {
    attempts: Arc<AtomicUsize>,
    fail_first: Arc<AtomicUsize>,
    delay: Duration,
    unhealthy: bool,
    created: Arc<Mutex<Vec<Arc<ConnState>>>>,
}

impl CountingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(self, n: usize) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn unhealthy_on_arrival(mut self) -> Self {
        self.unhealthy = true;
        self
    }

    pub async fn connect(&self) -> Result<FakeConnection, StructuredError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err(StructuredError::new("ECONNREFUSED", "connection refused"));
        }

        let mut created = self.created.lock().unwrap();
        let state = Arc::new(ConnState {
            id: created.len(),
            healthy: AtomicBool::new(!self.unhealthy),
            closed: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
        });
        created.push(Arc::clone(&state));
        Ok(FakeConnection { state })
    }

    /// Connect attempts, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Connections successfully created.
    pub fn created(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn connection(&self, id: usize) -> Arc<ConnState> {
        Arc::clone(&self.created.lock().unwrap()[id])
    }

    pub fn open_connections(&self) -> usize {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|c| !c.is_closed())
            .count()
    }
}
