//! Connection manager: connection lifecycle and inbound message handling.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use camrelay_core::config::RealtimeConfig;
use camrelay_core::types::ConnectionId;

use crate::message::types::OutboundMessage;
use crate::message::validator::{parse_inbound, validate_ack_id};
use crate::metrics::EngineMetrics;
use crate::relay::router::{RelayOutcome, RelayRouter};

use super::handle::ConnectionHandle;
use super::heartbeat::HeartbeatConfig;
use super::pool::ConnectionPool;

/// Ack reason for dropped events. Deliberately vague so a client cannot
/// probe which connections exist.
const DROPPED_REASON: &str = "not delivered";

/// Manages all active WebSocket connections.
#[derive(Debug)]
pub struct ConnectionManager {
    /// Connection pool.
    pool: Arc<ConnectionPool>,
    /// Relay router.
    router: Arc<RelayRouter>,
    /// Metrics.
    metrics: Arc<EngineMetrics>,
    /// Configuration.
    config: RealtimeConfig,
}

impl ConnectionManager {
    /// Creates a new connection manager.
    pub fn new(
        config: RealtimeConfig,
        pool: Arc<ConnectionPool>,
        router: Arc<RelayRouter>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            pool,
            router,
            metrics,
            config,
        }
    }

    /// Registers a new connection.
    ///
    /// Returns the connection handle and a receiver for outbound messages.
    pub async fn register(&self) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(self.config.channel_buffer_size.max(1));
        let handle = Arc::new(ConnectionHandle::new(tx));

        self.pool.add(handle.clone());
        self.router.connect(handle.id).await;
        self.metrics.connection_opened();

        info!(conn_id = %handle.id, "WebSocket connection registered");

        (handle, rx)
    }

    /// Unregisters a connection and runs the departure path.
    ///
    /// Idempotent; the transport task calls it on every exit path.
    pub async fn unregister(&self, conn_id: &ConnectionId) {
        let removed = self.pool.remove(conn_id);
        if let Some(handle) = &removed {
            handle.mark_dead();
        }

        self.router.disconnect(*conn_id).await;

        if removed.is_some() {
            self.metrics.connection_closed();
            info!(conn_id = %conn_id, "WebSocket connection unregistered");
        }
    }

    /// Processes an inbound text message from a client.
    pub async fn handle_inbound(&self, conn_id: &ConnectionId, raw_message: &str) -> RelayOutcome {
        let Some(handle) = self.pool.get(conn_id) else {
            warn!(conn_id = %conn_id, "Message from unknown connection");
            return RelayOutcome::Dropped {
                reason: "unknown connection",
            };
        };

        handle.touch().await;

        let envelope = match parse_inbound(raw_message, self.config.max_message_bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "Rejected inbound message");
                let _ = handle.send(OutboundMessage::from_error(&e));
                return RelayOutcome::Rejected(e);
            }
        };

        if let Some(ack_id) = &envelope.ack_id {
            if let Err(e) = validate_ack_id(ack_id) {
                let _ = handle.send(OutboundMessage::from_error(&e));
                return RelayOutcome::Rejected(e);
            }
        }

        let kind = envelope.message.kind();
        let outcome = self.router.route(*conn_id, envelope.message).await;

        match &outcome {
            RelayOutcome::Handled => {}
            RelayOutcome::Dropped { reason } => {
                debug!(conn_id = %conn_id, kind, reason, "Inbound event dropped");
            }
            RelayOutcome::Rejected(e) => {
                debug!(conn_id = %conn_id, kind, error = %e, "Inbound event rejected");
                if envelope.ack_id.is_none() {
                    let _ = handle.send(OutboundMessage::from_error(e));
                }
            }
        }

        if let Some(ack_id) = envelope.ack_id {
            let (ok, reason) = match &outcome {
                RelayOutcome::Handled => (true, None),
                RelayOutcome::Dropped { .. } => (false, Some(DROPPED_REASON.to_string())),
                RelayOutcome::Rejected(e) => (false, Some(e.message.clone())),
            };
            let _ = handle.send(OutboundMessage::Ack { ack_id, ok, reason });
        }

        outcome
    }

    /// Asks every connection to close.
    pub async fn close_all(&self) {
        let all = self.pool.all_connections();
        for conn in &all {
            conn.force_close();
        }
        info!(count = all.len(), "All connections closed");
    }

    /// Returns the total connection count.
    pub fn connection_count(&self) -> usize {
        self.pool.connection_count()
    }

    /// Liveness settings for per-connection heartbeat tasks.
    pub fn heartbeat_config(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            check_interval: self.config.heartbeat_interval(),
            idle_timeout: self.config.heartbeat_timeout(),
        }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }
}
