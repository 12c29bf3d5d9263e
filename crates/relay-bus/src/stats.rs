//! # Event Statistics
//!
//! Per-event counters updated on every dispatch. Counters only grow; the
//! only way down is an explicit reset.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

/// Counters for one event name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventStats {
    /// Successful emits (validation passed).
    pub emit_count: u64,
    /// Subscribers matched by the most recent emit.
    pub listener_count: usize,
    /// Validation failures plus handler failures.
    pub error_count: u64,
    /// Time of the most recent emit.
    pub last_emit_time: Option<SystemTime>,
    /// Time of the most recent error.
    pub last_error_time: Option<SystemTime>,
    /// Summed handler wall time.
    pub total_execution_time: Duration,
}

impl EventStats {
    /// Mean handler time per emit.
    #[must_use]
    pub fn average_execution_time(&self) -> Duration {
        match u32::try_from(self.emit_count) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_execution_time / n,
            Err(_) => Duration::ZERO,
        }
    }
}

/// Lock-protected table of [`EventStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsTable {
    inner: Mutex<HashMap<String, EventStats>>,
}

impl StatsTable {
    pub(crate) fn record_emit(&self, name: &str, listeners: usize) {
        let mut table = self.inner.lock();
        let stats = table.entry(name.to_string()).or_default();
        stats.emit_count += 1;
        stats.listener_count = listeners;
        stats.last_emit_time = Some(SystemTime::now());
    }

    pub(crate) fn record_error(&self, name: &str) {
        let mut table = self.inner.lock();
        let stats = table.entry(name.to_string()).or_default();
        stats.error_count += 1;
        stats.last_error_time = Some(SystemTime::now());
    }

    pub(crate) fn record_execution(&self, name: &str, elapsed: Duration) {
        let mut table = self.inner.lock();
        table
            .entry(name.to_string())
            .or_default()
            .total_execution_time += elapsed;
    }

    pub(crate) fn get(&self, name: &str) -> Option<EventStats> {
        self.inner.lock().get(name).cloned()
    }

    pub(crate) fn all(&self) -> HashMap<String, EventStats> {
        self.inner.lock().clone()
    }

    pub(crate) fn reset(&self, name: Option<&str>) {
        let mut table = self.inner.lock();
        match name {
            Some(name) => {
                table.remove(name);
            }
            None => table.clear(),
        }
    }
}
