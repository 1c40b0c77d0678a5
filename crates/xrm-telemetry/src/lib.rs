//! Structured logging setup and lightweight in-process counters.
//!
//! No metrics transport lives here — [`Counters`] is read back out by
//! whatever external reporter a deployment wires up; this crate never
//! opens a network listener.
#![warn(missing_docs)]

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Initialize the global `tracing` subscriber.
///
/// Precedence: `SHOVELER_LOG_LEVEL` env var, then `debug` (maps to
/// `relay=debug`), then `RUST_LOG`, then `relay=info`. Every subsystem
/// logs through targets namespaced `relay.<subsystem>`.
pub fn init_tracing(debug: bool) {
    let filter = if let Ok(level) = std::env::var("SHOVELER_LOG_LEVEL") {
        EnvFilter::new(format!("relay={level}"))
    } else if debug {
        EnvFilter::new("relay=debug")
    } else {
        EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("relay=info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Thread-safe in-process counters for the relay's internal state.
///
/// Cloning shares the same underlying counters (cheap `Arc` clone),
/// matching how the correlator/queue/publisher each hold one handle.
#[derive(Debug, Clone, Default)]
pub struct Counters {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    reconnects: AtomicU64,
    validation_failures: AtomicU64,
    publish_failures: AtomicU64,
    records_emitted: AtomicU64,
    queue_depth: AtomicI64,
}

impl Counters {
    /// Create a fresh, zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr_reconnects(&self) {
        self.inner.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_validation_failures(&self) {
        self.inner.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_publish_failures(&self) {
        self.inner.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_records_emitted(&self, by: u64) {
        self.inner.records_emitted.fetch_add(by, Ordering::Relaxed);
    }

    /// Set the current queue depth gauge.
    pub fn set_queue_depth(&self, depth: i64) {
        self.inner.queue_depth.store(depth, Ordering::Relaxed);
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            reconnects: self.inner.reconnects.load(Ordering::Relaxed),
            validation_failures: self.inner.validation_failures.load(Ordering::Relaxed),
            publish_failures: self.inner.publish_failures.load(Ordering::Relaxed),
            records_emitted: self.inner.records_emitted.load(Ordering::Relaxed),
            queue_depth: self.inner.queue_depth.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time read of every [`Counters`] value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountersSnapshot {
    pub reconnects: u64,
    pub validation_failures: u64,
    pub publish_failures: u64,
    pub records_emitted: u64,
    pub queue_depth: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_counters_are_zero() {
        let snapshot = Counters::new().snapshot();
        assert_eq!(snapshot, CountersSnapshot::default());
    }

    #[test]
    fn increments_are_independent() {
        let counters = Counters::new();
        counters.incr_reconnects();
        counters.incr_reconnects();
        counters.incr_validation_failures();
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.reconnects, 2);
        assert_eq!(snapshot.validation_failures, 1);
        assert_eq!(snapshot.publish_failures, 0);
    }

    #[test]
    fn cloned_handle_shares_state() {
        let a = Counters::new();
        let b = a.clone();
        b.incr_records_emitted(5);
        assert_eq!(a.snapshot().records_emitted, 5);
    }

    #[test]
    fn queue_depth_is_a_gauge_not_a_counter() {
        let counters = Counters::new();
        counters.set_queue_depth(42);
        counters.set_queue_depth(7);
        assert_eq!(counters.snapshot().queue_depth, 7);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let counters = Counters::new();
        counters.incr_publish_failures();
        let json = serde_json::to_string(&counters.snapshot()).unwrap();
        assert!(json.contains("\"publish_failures\":1"));
    }
}
