//! The session store and connection registry, held together.

use camrelay_core::types::{ConnectionId, PeerRole, SessionCode};

use crate::message::types::OutboundMessage;
use crate::room::registry::ConnectionRegistry;
use crate::session::store::SessionStore;

/// Everything guarded by the router's lock.
#[derive(Debug)]
pub struct RoomState {
    /// Session records.
    pub sessions: SessionStore,
    /// Connection records.
    pub registry: ConnectionRegistry,
}

impl RoomState {
    /// Creates empty state.
    pub fn new(id_retry_budget: u32) -> Self {
        Self {
            sessions: SessionStore::new(id_retry_budget),
            registry: ConnectionRegistry::new(),
        }
    }

    /// Membership snapshot for a session, or `None` once it is gone.
    pub fn room_info(&self, code: &SessionCode) -> Option<OutboundMessage> {
        let session = self.sessions.get(code).ok()?;
        Some(OutboundMessage::RoomInfo {
            session_id: code.clone(),
            producer_connected: session.producer().is_some(),
            consumer_count: session.consumer_count(),
            last_activity_at: session.last_activity_at,
        })
    }

    /// Every connection bound to a session except `exclude`.
    pub fn members_except(&self, code: &SessionCode, exclude: ConnectionId) -> Vec<ConnectionId> {
        self.registry
            .connections_in_session(code, None)
            .into_iter()
            .filter(|id| *id != exclude)
            .collect()
    }

    /// Connections bound to a session under `role`, except `exclude`.
    pub fn role_except(
        &self,
        code: &SessionCode,
        role: PeerRole,
        exclude: ConnectionId,
    ) -> Vec<ConnectionId> {
        self.registry
            .connections_in_session(code, Some(role))
            .into_iter()
            .filter(|id| *id != exclude)
            .collect()
    }
}
