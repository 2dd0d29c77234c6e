//! Relay engine metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Engine-level metrics counters.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Total connections established
    pub connections_total: AtomicU64,
    /// Connections currently open
    pub connections_active: AtomicU64,
    /// Sessions created
    pub sessions_created: AtomicU64,
    /// Sessions removed by the reaper
    pub sessions_expired: AtomicU64,
    /// Frames accepted from producers
    pub frames_relayed: AtomicU64,
    /// Signaling messages delivered
    pub signals_relayed: AtomicU64,
    /// Outbound messages that could not be queued
    pub messages_dropped: AtomicU64,
    /// Producer slot takeovers
    pub producers_replaced: AtomicU64,
}

impl EngineMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection
    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a disconnection
    pub fn connection_closed(&self) {
        let _ = self
            .connections_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    /// Record a session creation
    pub fn session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a reaped session
    pub fn session_expired(&self) {
        self.sessions_expired.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accepted frame
    pub fn frame_relayed(&self) {
        self.frames_relayed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delivered signal
    pub fn signal_relayed(&self) {
        self.signals_relayed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record dropped deliveries
    pub fn messages_dropped(&self, count: u64) {
        if count > 0 {
            self.messages_dropped.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Record a producer takeover
    pub fn producer_replaced(&self) {
        self.producers_replaced.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_expired: self.sessions_expired.load(Ordering::Relaxed),
            frames_relayed: self.frames_relayed.load(Ordering::Relaxed),
            signals_relayed: self.signals_relayed.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            producers_replaced: self.producers_replaced.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Total connections ever established
    pub connections_total: u64,
    /// Currently active connections
    pub connections_active: u64,
    /// Sessions created
    pub sessions_created: u64,
    /// Sessions reaped
    pub sessions_expired: u64,
    /// Frames relayed
    pub frames_relayed: u64,
    /// Signals relayed
    pub signals_relayed: u64,
    /// Messages dropped
    pub messages_dropped: u64,
    /// Producer takeovers
    pub producers_replaced: u64,
}
