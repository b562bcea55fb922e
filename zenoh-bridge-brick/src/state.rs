//! Shared runtime state: the sampling switch and observability counters.
//!
//! One [`BridgeState`] is created at startup and shared (behind an `Arc`)
//! between the telemetry loop and every inbound-callback task. Each field
//! only ever needs single-field atomicity: the switch is a lone boolean with
//! last-write-wins semantics, and the counters are independent tallies.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Per-category event tallies. Observability only; nothing depends on them
/// for correctness.
#[derive(Debug, Default)]
pub struct Counters {
    pub received: AtomicU64,
    pub sent: AtomicU64,
    pub twin_updates: AtomicU64,
    pub method_calls: AtomicU64,
    pub blob_uploads: AtomicU64,
}

/// Point-in-time copy of [`Counters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountersSnapshot {
    pub received: u64,
    pub sent: u64,
    pub twin_updates: u64,
    pub method_calls: u64,
    pub blob_uploads: u64,
}

impl Counters {
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            received: self.received.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            twin_updates: self.twin_updates.load(Ordering::Relaxed),
            method_calls: self.method_calls.load(Ordering::Relaxed),
            blob_uploads: self.blob_uploads.load(Ordering::Relaxed),
        }
    }
}

/// Shared context object for the loop and the callback handlers.
#[derive(Debug)]
pub struct BridgeState {
    /// Whether the loop publishes at the next tick boundary. Mutated only by
    /// the remote method handler; in-memory only, so a restart comes back
    /// enabled.
    sampling_enabled: AtomicBool,

    pub counters: Counters,

    last_sent: Mutex<Option<DateTime<Utc>>>,
    last_received: Mutex<Option<DateTime<Utc>>>,
}

impl BridgeState {
    pub fn new() -> Self {
        Self {
            sampling_enabled: AtomicBool::new(true),
            counters: Counters::default(),
            last_sent: Mutex::new(None),
            last_received: Mutex::new(None),
        }
    }

    pub fn sampling_enabled(&self) -> bool {
        self.sampling_enabled.load(Ordering::Relaxed)
    }

    pub fn set_sampling(&self, enabled: bool) {
        self.sampling_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Record the time of the latest confirmed publish.
    pub fn record_sent(&self, at: DateTime<Utc>) {
        *self.last_sent.lock() = Some(at);
    }

    pub fn last_sent(&self) -> Option<DateTime<Utc>> {
        *self.last_sent.lock()
    }

    /// Record the time of the latest inbound message.
    pub fn record_received(&self, at: DateTime<Utc>) {
        *self.last_received.lock() = Some(at);
    }

    pub fn last_received(&self) -> Option<DateTime<Utc>> {
        *self.last_received.lock()
    }
}

impl Default for BridgeState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_enabled_by_default() {
        let state = BridgeState::new();
        assert!(state.sampling_enabled());
    }

    #[test]
    fn test_sampling_toggle_last_write_wins() {
        let state = BridgeState::new();
        state.set_sampling(false);
        assert!(!state.sampling_enabled());
        state.set_sampling(true);
        state.set_sampling(false);
        assert!(!state.sampling_enabled());
    }

    #[test]
    fn test_counters_snapshot() {
        let state = BridgeState::new();
        state.counters.sent.fetch_add(3, Ordering::Relaxed);
        state.counters.method_calls.fetch_add(1, Ordering::Relaxed);

        let snapshot = state.counters.snapshot();
        assert_eq!(snapshot.sent, 3);
        assert_eq!(snapshot.method_calls, 1);
        assert_eq!(snapshot.received, 0);
        assert_eq!(snapshot.blob_uploads, 0);
    }

    #[test]
    fn test_last_sent_starts_empty() {
        let state = BridgeState::new();
        assert!(state.last_sent().is_none());

        let now = Utc::now();
        state.record_sent(now);
        assert_eq!(state.last_sent(), Some(now));
    }
}
