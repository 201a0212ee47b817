// src/report/log.rs

//! In-memory, ordered attempt history.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::StructuredError;

/// One failed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub timestamp: DateTime<Utc>,
    /// Label of the supervised operation (e.g. `"install"`).
    pub operation: String,
    /// 1-based attempt number.
    pub attempt: u32,
    pub max_attempts: u32,
    pub error: StructuredError,
    pub retryable: bool,
}

/// Shared handle to the error log of one supervisor instance.
///
/// Cloning is cheap; all clones append to the same sequence. Entries are
/// only ever appended, so the order is the order attempts were recorded in.
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    entries: Arc<Mutex<Vec<ErrorLogEntry>>>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: ErrorLogEntry) {
        self.lock().push(entry);
    }

    /// Snapshot of all entries.
    pub fn entries(&self) -> Vec<ErrorLogEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ErrorLogEntry>> {
        // A panic while holding the lock cannot leave a Vec half-pushed.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
