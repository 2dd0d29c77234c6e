//! Session records and their read-only views.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use camrelay_core::types::{ConnectionId, SessionCode};

use crate::message::FramePayload;

/// Most recent frame, kept so late consumers can catch up.
#[derive(Debug, Clone)]
pub struct CachedFrame {
    /// Frame bytes.
    pub payload: FramePayload,
    /// Producer-supplied metadata.
    pub metadata: Option<serde_json::Value>,
    /// Sequence number assigned on receipt.
    pub sequence: u64,
    /// When the server received it.
    pub received_at: DateTime<Utc>,
}

/// A pairing context: at most one producer, any number of consumers.
///
/// The producer slot and consumer set are only changed through
/// [`crate::room::ConnectionRegistry`], which updates the connection side
/// in the same step.
#[derive(Debug, Clone)]
pub struct Session {
    /// Normalized session code.
    pub id: SessionCode,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Advanced by joins, frames and signaling.
    pub last_activity_at: DateTime<Utc>,
    pub(crate) producer: Option<ConnectionId>,
    pub(crate) consumers: HashSet<ConnectionId>,
    pub(crate) last_frame: Option<CachedFrame>,
    pub(crate) frame_sequence: u64,
}

impl Session {
    pub(crate) fn new(id: SessionCode, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: now,
            last_activity_at: now,
            producer: None,
            consumers: HashSet::new(),
            last_frame: None,
            frame_sequence: 0,
        }
    }

    /// Connection holding the producer slot.
    pub fn producer(&self) -> Option<ConnectionId> {
        self.producer
    }

    /// Bound consumers.
    pub fn consumers(&self) -> &HashSet<ConnectionId> {
        &self.consumers
    }

    /// Number of bound consumers.
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Cached frame, if any.
    pub fn last_frame(&self) -> Option<&CachedFrame> {
        self.last_frame.as_ref()
    }

    /// Frames received so far.
    pub fn frame_sequence(&self) -> u64 {
        self.frame_sequence
    }

    /// Stores a new frame and returns its sequence number.
    pub(crate) fn record_frame(
        &mut self,
        payload: FramePayload,
        metadata: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> u64 {
        self.frame_sequence += 1;
        self.last_frame = Some(CachedFrame {
            payload,
            metadata,
            sequence: self.frame_sequence,
            received_at: now,
        });
        self.last_activity_at = now;
        self.frame_sequence
    }

    /// Serializable view for the control plane.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
            producer_connected: self.producer.is_some(),
            producer_id: self.producer,
            consumer_count: self.consumers.len(),
            frame_sequence: self.frame_sequence,
            has_cached_frame: self.last_frame.is_some(),
        }
    }
}

/// Read-only session view (serializable).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session code.
    pub id: SessionCode,
    /// Created at.
    pub created_at: DateTime<Utc>,
    /// Last activity.
    pub last_activity_at: DateTime<Utc>,
    /// Whether a producer is bound.
    pub producer_connected: bool,
    /// Producer connection id.
    pub producer_id: Option<ConnectionId>,
    /// Bound consumer count.
    pub consumer_count: usize,
    /// Frames received.
    pub frame_sequence: u64,
    /// Whether a catch-up frame is cached.
    pub has_cached_frame: bool,
}

/// Aggregate stats for the control plane's list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Number of sessions in the store.
    pub session_count: usize,
    /// Number of live transport connections.
    pub connection_count: usize,
    /// Per-session views, oldest first.
    pub sessions: Vec<SessionSnapshot>,
}
