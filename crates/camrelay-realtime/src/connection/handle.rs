//! Individual WebSocket connection handle.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;

use camrelay_core::types::ConnectionId;

use crate::message::types::OutboundMessage;

/// Why a message could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The connection is closed or closing.
    Closed,
    /// The outbound buffer is full; the message was dropped.
    Full,
}

/// A handle to a single WebSocket connection.
///
/// Holds the sender channel for pushing messages to the client. The
/// transport task owns the matching receiver and writes whatever arrives
/// to the socket.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection ID
    pub id: ConnectionId,
    /// Sender for outbound messages
    sender: mpsc::Sender<OutboundMessage>,
    /// Last inbound traffic
    pub last_activity: RwLock<DateTime<Utc>>,
    /// Whether the connection is still alive
    alive: AtomicBool,
    /// Fired when the server wants the transport closed
    closer: CancellationToken,
}

impl ConnectionHandle {
    /// Create a new connection handle
    pub fn new(sender: mpsc::Sender<OutboundMessage>) -> Self {
        let now = Utc::now();
        Self {
            id: ConnectionId::new(),
            sender,
            last_activity: RwLock::new(now),
            alive: AtomicBool::new(true),
            closer: CancellationToken::new(),
        }
    }

    /// Queue an outbound message without waiting.
    pub fn send(&self, msg: OutboundMessage) -> Result<(), SendError> {
        if !self.is_alive() {
            return Err(SendError::Closed);
        }
        match self.sender.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(conn_id = %self.id, "Send buffer full, dropping message");
                Err(SendError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_dead();
                Err(SendError::Closed)
            }
        }
    }

    /// Check if connection is alive
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Mark connection as dead
    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Ask the transport to close after flushing queued messages.
    pub fn force_close(&self) {
        self.mark_dead();
        self.closer.cancel();
    }

    /// Token the transport task selects on to learn about forced closes.
    pub fn close_token(&self) -> CancellationToken {
        self.closer.clone()
    }

    /// Update last activity timestamp
    pub async fn touch(&self) {
        let mut la = self.last_activity.write().await;
        *la = Utc::now();
    }

    /// Seconds since the last inbound traffic.
    pub async fn idle_for(&self) -> chrono::Duration {
        Utc::now() - *self.last_activity.read().await
    }
}
