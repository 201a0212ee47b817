// src/pool.rs

//! Keyed pool of long-lived external connections.
//!
//! Each key owns one slot guarded by an async mutex. `acquire` holds the
//! slot for the whole check / reconnect sequence, so two concurrent callers
//! asking for the same key never create two connections: the second waits
//! and then reuses what the first stored. Different keys do not contend
//! beyond a short map lookup.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::{ErrorCode, StructuredError};
use crate::exec::BoxFuture;
use crate::retry::{Retrier, RetryPolicy};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A connection the pool can probe and close.
pub trait PooledConnection: Send + Sync + 'static {
    fn health_check(&self) -> BoxFuture<'_, Result<(), StructuredError>>;
    fn close(&self) -> BoxFuture<'_, Result<(), StructuredError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub connect_policy: RetryPolicy,
    pub connect_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            connect_policy: RetryPolicy::attempts(3),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

struct PooledEntry<C> {
    conn: Arc<C>,
    last_health: HealthStatus,
    checked_at: Instant,
    /// Eviction count of the slot when this entry was stored.
    epoch: u64,
}

/// One key's connection. Slots are never removed from the map (except by
/// `shutdown`), so every caller for a key serialises on the same lock.
struct KeySlot<C> {
    entry: AsyncMutex<Option<PooledEntry<C>>>,
    evictions: AtomicU64,
}

impl<C> Default for KeySlot<C> {
    fn default() -> Self {
        Self {
            entry: AsyncMutex::new(None),
            evictions: AtomicU64::new(0),
        }
    }
}

type Slot<C> = Arc<KeySlot<C>>;

struct PoolInner<C> {
    slots: Mutex<HashMap<String, Slot<C>>>,
    options: PoolOptions,
    retrier: Retrier,
}

/// Process-wide connection pool. Clones share the same slots.
pub struct ConnectionPool<C> {
    inner: Arc<PoolInner<C>>,
}

impl<C> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: PooledConnection> Default for ConnectionPool<C> {
    fn default() -> Self {
        Self::new(PoolOptions::default())
    }
}

impl<C: PooledConnection> ConnectionPool<C> {
    pub fn new(options: PoolOptions) -> Self {
        Self::with_retrier(options, Retrier::default())
    }

    /// Use a specific retrier, e.g. to share an error log or a cancellation
    /// token with a supervisor.
    pub fn with_retrier(options: PoolOptions, retrier: Retrier) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                slots: Mutex::new(HashMap::new()),
                options,
                retrier,
            }),
        }
    }

    /// Return the pooled connection for `key`, reconnecting through
    /// `factory` when there is none or it fails its health check.
    pub async fn acquire<F, Fut>(&self, key: &str, factory: F) -> Result<Arc<C>, StructuredError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<C, StructuredError>>,
    {
        let slot = self.slot(key);
        let mut guard = slot.entry.lock().await;

        if let Some(entry) = guard.take() {
            match entry.conn.health_check().await {
                Ok(()) => {
                    debug!(key, "reusing pooled connection");
                    let conn = Arc::clone(&entry.conn);
                    *guard = Some(PooledEntry {
                        last_health: HealthStatus::Healthy,
                        checked_at: Instant::now(),
                        ..entry
                    });
                    return Ok(conn);
                }
                Err(e) => {
                    warn!(key, error = %e, "pooled connection failed health check; evicting");
                    close_quietly(key, &*entry.conn).await;
                }
            }
        }

        let conn = self.connect(key, &factory).await?;

        if let Err(e) = conn.health_check().await {
            close_quietly(key, &conn).await;
            return Err(StructuredError::new(
                ErrorCode::ConnectionTestFailed,
                format!("new connection for '{key}' failed its health check"),
            )
            .with_detail("key", key)
            .with_cause("cause", &e));
        }

        let conn = Arc::new(conn);
        *guard = Some(PooledEntry {
            conn: Arc::clone(&conn),
            last_health: HealthStatus::Healthy,
            checked_at: Instant::now(),
            epoch: slot.evictions.load(Ordering::SeqCst),
        });
        info!(key, "connection established and pooled");
        Ok(conn)
    }

    async fn connect<F, Fut>(&self, key: &str, factory: &F) -> Result<C, StructuredError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<C, StructuredError>>,
    {
        let timeout = self.inner.options.connect_timeout;
        // Anything short of a terminal code is worth reconnecting for.
        let classifier = |e: &StructuredError| !e.code().is_terminal();

        let result = self
            .inner
            .retrier
            .execute(&format!("connect:{key}"), &self.inner.options.connect_policy, &classifier, || async move {
                match tokio::time::timeout(timeout, factory()).await {
                    Ok(result) => result,
                    Err(_) => Err(StructuredError::new(
                        ErrorCode::ConnectionTimeout,
                        format!("connecting '{key}' took longer than {}ms", timeout.as_millis()),
                    )
                    .with_detail("key", key)
                    .with_detail("timeout_ms", timeout.as_millis() as u64)),
                }
            })
            .await;

        result.map_err(|e| {
            if *e.code() == ErrorCode::MaxRetriesExceeded {
                StructuredError::new(
                    ErrorCode::ConnectionExhausted,
                    format!("could not connect '{key}' after {} attempts", self.inner.options.connect_policy.effective_attempts()),
                )
                .with_detail("key", key)
                .with_cause("cause", &e)
            } else {
                e
            }
        })
    }

    /// Drop and close the connection pooled for `key` at the time of the
    /// call, if any.
    ///
    /// A connection that an in-flight `acquire` stores after this call
    /// started is newer than the eviction and stays pooled.
    pub async fn evict(&self, key: &str) {
        let Some(slot) = self.slots().get(key).cloned() else {
            return;
        };
        let epoch = slot.evictions.fetch_add(1, Ordering::SeqCst) + 1;

        let mut guard = slot.entry.lock().await;
        if guard.as_ref().is_some_and(|e| e.epoch < epoch) {
            if let Some(entry) = guard.take() {
                close_quietly(key, &*entry.conn).await;
            }
        } else {
            debug!(key, "nothing older than the eviction is pooled");
        }
    }

    /// Close every pooled connection and clear the pool.
    ///
    /// Close failures are logged, never returned.
    pub async fn shutdown(&self) {
        let drained: Vec<(String, Slot<C>)> = self.slots().drain().collect();
        let mut closed = 0usize;

        for (key, slot) in drained {
            if let Some(entry) = slot.entry.lock().await.take() {
                close_quietly(&key, &*entry.conn).await;
                closed += 1;
            }
        }

        info!(closed, "connection pool shut down");
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of live pooled connections.
    pub async fn len(&self) -> usize {
        let slots: Vec<Slot<C>> = self.slots().values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.entry.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.last_health(key).await.is_some()
    }

    /// Probe the pooled connection for `key` without handing it out.
    ///
    /// The outcome is recorded; an unhealthy entry stays pooled until the
    /// next `acquire` replaces it.
    pub async fn check(&self, key: &str) -> Option<HealthStatus> {
        let slot = self.slots().get(key).cloned()?;
        let mut guard = slot.entry.lock().await;
        let entry = guard.as_mut()?;

        entry.last_health = match entry.conn.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => {
                debug!(key, error = %e, "health probe failed");
                HealthStatus::Unhealthy
            }
        };
        entry.checked_at = Instant::now();
        Some(entry.last_health)
    }

    /// Outcome of the most recent health check for `key`.
    pub async fn last_health(&self, key: &str) -> Option<HealthStatus> {
        let slot = self.slots().get(key).cloned()?;
        let guard = slot.entry.lock().await;
        guard.as_ref().map(|e| e.last_health)
    }

    /// Time since the pooled connection for `key` was last probed.
    pub async fn checked_ago(&self, key: &str) -> Option<Duration> {
        let slot = self.slots().get(key).cloned()?;
        let guard = slot.entry.lock().await;
        guard.as_ref().map(|e| e.checked_at.elapsed())
    }

    fn slot(&self, key: &str) -> Slot<C> {
        Arc::clone(self.slots().entry(key.to_string()).or_default())
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot<C>>> {
        self.inner
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn close_quietly<C: PooledConnection>(key: &str, conn: &C) {
    match conn.close().await {
        Ok(()) => debug!(key, "connection closed"),
        Err(e) => warn!(key, error = %e, "failed to close connection"),
    }
}
