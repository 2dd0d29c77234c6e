//! Connection registry: which session and role each connection holds.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info};

use camrelay_core::error::AppError;
use camrelay_core::result::AppResult;
use camrelay_core::types::{ConnectionId, ConnectionRole, PeerRole, SessionCode};

use crate::session::store::SessionStore;

/// Registry entry for one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    /// Connection id.
    pub id: ConnectionId,
    /// Session the connection is bound to.
    pub session: Option<SessionCode>,
    /// Role, `Unassigned` until a join succeeds.
    pub role: ConnectionRole,
}

/// A connection's session and role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Session code.
    pub session: SessionCode,
    /// Role within it.
    pub role: PeerRole,
}

/// Result of a successful bind.
#[derive(Debug, Clone, Default)]
pub struct BindOutcome {
    /// Binding the connection held before this call.
    pub previous: Option<Binding>,
    /// Producer evicted from the slot, which must now be disconnected.
    pub replaced: Option<ConnectionId>,
}

impl BindOutcome {
    /// Whether the call re-joined the exact same session and role.
    pub fn is_rejoin(&self, binding: &Binding) -> bool {
        self.previous.as_ref() == Some(binding)
    }
}

/// Owns every connection record.
///
/// `bind` and `unbind` take the session store as well, so the session's
/// producer slot and consumer set change in the same step as the record.
/// Both are held behind one lock by [`crate::relay::RelayRouter`].
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Connection ID → record.
    records: HashMap<ConnectionId, ConnectionRecord>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly connected, unassigned connection.
    pub fn register(&mut self, conn_id: ConnectionId) {
        self.records.entry(conn_id).or_insert_with(|| ConnectionRecord {
            id: conn_id,
            session: None,
            role: ConnectionRole::Unassigned,
        });
    }

    /// Drops a connection's record. Call [`Self::unbind`] first.
    pub fn forget(&mut self, conn_id: &ConnectionId) -> Option<ConnectionRecord> {
        self.records.remove(conn_id)
    }

    /// Returns a connection's current binding.
    pub fn binding(&self, conn_id: &ConnectionId) -> Option<Binding> {
        let record = self.records.get(conn_id)?;
        let session = record.session.clone()?;
        let role = match record.role {
            ConnectionRole::Producer => PeerRole::Producer,
            ConnectionRole::Consumer => PeerRole::Consumer,
            ConnectionRole::Unassigned => return None,
        };
        Some(Binding { session, role })
    }

    /// Binds a connection to a session under a role.
    ///
    /// All checks run before any mutation, so an error leaves both the
    /// registry and the store untouched. A producer claiming a slot held
    /// by another connection evicts it; the evicted connection is unbound
    /// here and returned in [`BindOutcome::replaced`].
    pub fn bind(
        &mut self,
        sessions: &mut SessionStore,
        conn_id: ConnectionId,
        code: &SessionCode,
        role: PeerRole,
    ) -> AppResult<BindOutcome> {
        if !sessions.contains(code) {
            return Err(AppError::not_found(format!("Session {code} not found")));
        }
        if !self.records.contains_key(&conn_id) {
            return Err(AppError::not_found(format!(
                "Connection {conn_id} is not registered"
            )));
        }

        let now = Utc::now();
        let wanted = Binding {
            session: code.clone(),
            role,
        };

        if self.binding(&conn_id).as_ref() == Some(&wanted) {
            sessions.touch(code, now);
            return Ok(BindOutcome {
                previous: Some(wanted),
                replaced: None,
            });
        }

        let previous = self.unbind(sessions, &conn_id);

        let session = sessions.get_mut(code)?;
        let mut replaced = None;
        match role {
            PeerRole::Producer => {
                if let Some(old) = session.producer.replace(conn_id) {
                    if old != conn_id {
                        replaced = Some(old);
                    }
                }
            }
            PeerRole::Consumer => {
                session.consumers.insert(conn_id);
            }
        }
        session.last_activity_at = now;

        if let Some(old) = replaced {
            if let Some(record) = self.records.get_mut(&old) {
                record.session = None;
                record.role = ConnectionRole::Unassigned;
            }
            info!(
                session_id = %code,
                old_producer = %old,
                new_producer = %conn_id,
                "Producer slot taken over"
            );
        }

        if let Some(record) = self.records.get_mut(&conn_id) {
            record.session = Some(code.clone());
            record.role = role.into();
        }

        debug!(conn_id = %conn_id, session_id = %code, role = %role, "Connection bound");

        Ok(BindOutcome { previous, replaced })
    }

    /// Releases whatever binding a connection holds.
    ///
    /// Idempotent: returns the released binding the first time and `None`
    /// afterwards, so departure notifications run exactly once.
    pub fn unbind(
        &mut self,
        sessions: &mut SessionStore,
        conn_id: &ConnectionId,
    ) -> Option<Binding> {
        let binding = self.binding(conn_id)?;

        if let Some(record) = self.records.get_mut(conn_id) {
            record.session = None;
            record.role = ConnectionRole::Unassigned;
        }

        if let Ok(session) = sessions.get_mut(&binding.session) {
            match binding.role {
                PeerRole::Producer => {
                    if session.producer == Some(*conn_id) {
                        session.producer = None;
                    }
                }
                PeerRole::Consumer => {
                    session.consumers.remove(conn_id);
                }
            }
        }

        debug!(
            conn_id = %conn_id,
            session_id = %binding.session,
            role = %binding.role,
            "Connection unbound"
        );

        Some(binding)
    }

    /// Connections bound to a session, optionally filtered by role.
    pub fn connections_in_session(
        &self,
        code: &SessionCode,
        role: Option<PeerRole>,
    ) -> Vec<ConnectionId> {
        self.records
            .values()
            .filter(|r| r.session.as_ref() == Some(code))
            .filter(|r| match role {
                Some(wanted) => r.role == ConnectionRole::from(wanted),
                None => r.role != ConnectionRole::Unassigned,
            })
            .map(|r| r.id)
            .collect()
    }
}
