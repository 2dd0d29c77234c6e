//! Session store: owns every session record.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, error};

use camrelay_core::error::AppError;
use camrelay_core::result::AppResult;
use camrelay_core::types::SessionCode;

use super::model::{Session, SessionSnapshot};

/// Mapping from session code to session state.
///
/// Not internally synchronized; [`crate::relay::RelayRouter`] holds it
/// together with the connection registry behind a single lock.
#[derive(Debug)]
pub struct SessionStore {
    /// Session code → session.
    sessions: HashMap<SessionCode, Session>,
    /// Attempts at drawing an unused code.
    retry_budget: u32,
}

impl SessionStore {
    /// Creates an empty store.
    pub fn new(retry_budget: u32) -> Self {
        Self {
            sessions: HashMap::new(),
            retry_budget: retry_budget.max(1),
        }
    }

    /// Creates a session under a fresh code.
    pub fn create_session(&mut self) -> AppResult<SessionCode> {
        let mut rng = rand::thread_rng();
        self.create_session_with(&mut rng, Utc::now())
    }

    /// Creates a session drawing codes from `rng`.
    ///
    /// Fails with `ResourceExhausted` when every attempt collides.
    pub fn create_session_with<R: Rng>(
        &mut self,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> AppResult<SessionCode> {
        for attempt in 1..=self.retry_budget {
            let code = SessionCode::generate(rng);
            if self.sessions.contains_key(&code) {
                debug!(attempt, code = %code, "Session code collision, retrying");
                continue;
            }
            self.sessions.insert(code.clone(), Session::new(code.clone(), now));
            return Ok(code);
        }

        error!(
            attempts = self.retry_budget,
            sessions = self.sessions.len(),
            "Session code space exhausted"
        );
        Err(AppError::resource_exhausted(format!(
            "Could not allocate a session id after {} attempts",
            self.retry_budget
        )))
    }

    /// Looks up a session.
    pub fn get(&self, code: &SessionCode) -> AppResult<&Session> {
        self.sessions
            .get(code)
            .ok_or_else(|| AppError::not_found(format!("Session {code} not found")))
    }

    /// Looks up a session for mutation.
    pub(crate) fn get_mut(&mut self, code: &SessionCode) -> AppResult<&mut Session> {
        self.sessions
            .get_mut(code)
            .ok_or_else(|| AppError::not_found(format!("Session {code} not found")))
    }

    /// Returns whether the session exists.
    pub fn contains(&self, code: &SessionCode) -> bool {
        self.sessions.contains_key(code)
    }

    /// Advances `last_activity_at`. No-op for unknown sessions.
    pub fn touch(&mut self, code: &SessionCode, now: DateTime<Utc>) {
        if let Some(session) = self.sessions.get_mut(code) {
            session.last_activity_at = now;
        }
    }

    /// Deletes a session. Bound connections must already be unbound.
    pub fn remove_session(&mut self, code: &SessionCode) -> Option<Session> {
        self.sessions.remove(code)
    }

    /// Sessions whose last activity is older than `idle` as of `now`.
    ///
    /// A cutoff before the earliest representable instant expires nothing.
    pub fn expired_as_of(&self, now: DateTime<Utc>, idle: chrono::Duration) -> Vec<SessionCode> {
        let Some(cutoff) = now.checked_sub_signed(idle) else {
            return Vec::new();
        };
        self.sessions
            .values()
            .filter(|s| s.last_activity_at < cutoff)
            .map(|s| s.id.clone())
            .collect()
    }

    /// Snapshots of every session, oldest first.
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        let mut all: Vec<SessionSnapshot> = self.sessions.values().map(Session::snapshot).collect();
        all.sort_by_key(|s| s.created_at);
        all
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
