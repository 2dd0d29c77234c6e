//! Relay router: applies inbound events to room state and fans out.
//!
//! Every event is handled in two phases under the room lock. The router
//! mutates the session store and registry and builds an ordered list of
//! deliveries, then pushes them onto the recipients' queues before the
//! lock is released. Queueing never blocks, so each recipient sees events
//! in the order the state changed. A failed delivery is counted and
//! skipped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use camrelay_core::config::SessionConfig;
use camrelay_core::error::AppError;
use camrelay_core::result::AppResult;
use camrelay_core::types::{ConnectionId, PeerRole, SessionCode};

use crate::connection::pool::ConnectionPool;
use crate::message::payload::FramePayload;
use crate::message::types::{InboundMessage, OutboundMessage, SignalKind};
use crate::metrics::EngineMetrics;
use crate::room::registry::{BindOutcome, Binding};
use crate::room::state::RoomState;
use crate::session::model::{SessionSnapshot, SessionStats};

/// One step of a fan-out plan.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Queue a message for a connection.
    Send(ConnectionId, OutboundMessage),
    /// Close a connection once its queue drains.
    Close(ConnectionId),
}

/// What became of an inbound event.
#[derive(Debug, Clone)]
pub enum RelayOutcome {
    /// Applied and fanned out.
    Handled,
    /// Ignored without telling the sender why.
    Dropped {
        /// Internal reason, for logs only.
        reason: &'static str,
    },
    /// Refused; the error goes back to the sender.
    Rejected(AppError),
}

impl RelayOutcome {
    /// Whether the event was applied.
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled)
    }
}

/// Routes inbound events between the members of a session.
#[derive(Debug)]
pub struct RelayRouter {
    /// Session store and registry behind one lock.
    state: Mutex<RoomState>,
    /// Live connections, for delivery.
    pool: Arc<ConnectionPool>,
    /// Counters.
    metrics: Arc<EngineMetrics>,
    /// Log frame progress every N frames; `0` disables.
    frame_log_interval: u64,
}

impl RelayRouter {
    /// Creates a router with empty state.
    pub fn new(config: &SessionConfig, pool: Arc<ConnectionPool>, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            state: Mutex::new(RoomState::new(config.id_retry_budget)),
            pool,
            metrics,
            frame_log_interval: config.frame_log_interval,
        }
    }

    /// Records a new, unassigned connection.
    pub async fn connect(&self, conn_id: ConnectionId) {
        self.state.lock().await.registry.register(conn_id);
    }

    /// Handles one inbound event from `conn_id`.
    pub async fn route(&self, conn_id: ConnectionId, message: InboundMessage) -> RelayOutcome {
        match message {
            InboundMessage::Join { session_id, role } => self.join(conn_id, &session_id, &role).await,
            InboundMessage::Leave => self.leave(conn_id).await,
            InboundMessage::Frame {
                session_id,
                payload,
                metadata,
            } => self.frame(conn_id, &session_id, payload, metadata).await,
            InboundMessage::SignalOffer { to, payload } => {
                self.signal(conn_id, SignalKind::Offer, to, payload).await
            }
            InboundMessage::SignalAnswer { to, payload } => {
                self.signal(conn_id, SignalKind::Answer, to, payload).await
            }
            InboundMessage::SignalIce { to, payload } => {
                self.signal(conn_id, SignalKind::Ice, to, payload).await
            }
            InboundMessage::HeartbeatPing => {
                let pong = OutboundMessage::HeartbeatPong {
                    timestamp: Utc::now(),
                };
                self.dispatch(vec![Delivery::Send(conn_id, pong)]);
                RelayOutcome::Handled
            }
        }
    }

    /// Runs the departure path for a closed transport.
    ///
    /// Safe to call more than once and for connections that never joined.
    pub async fn disconnect(&self, conn_id: ConnectionId) -> Option<Binding> {
        let binding = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let binding = state.registry.unbind(&mut state.sessions, &conn_id);
            state.registry.forget(&conn_id);
            if let Some(b) = &binding {
                self.dispatch(departure(state, conn_id, b));
            }
            binding
        };

        if let Some(b) = &binding {
            info!(
                conn_id = %conn_id,
                session_id = %b.session,
                role = %b.role,
                "Peer disconnected from session"
            );
        }
        binding
    }

    async fn join(&self, conn_id: ConnectionId, raw_session: &str, raw_role: &str) -> RelayOutcome {
        let code = match SessionCode::parse(raw_session) {
            Ok(code) => code,
            Err(e) => return RelayOutcome::Rejected(e),
        };
        let role: PeerRole = match raw_role.parse() {
            Ok(role) => role,
            Err(e) => return RelayOutcome::Rejected(e),
        };

        let replaced = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let outcome = match state.registry.bind(&mut state.sessions, conn_id, &code, role) {
                Ok(outcome) => outcome,
                Err(e) => {
                    debug!(conn_id = %conn_id, session_id = %code, error = %e, "Join refused");
                    return RelayOutcome::Rejected(e);
                }
            };
            // The catch-up frame must be queued before any live frame.
            self.dispatch(join_fanout(state, conn_id, &code, role, &outcome));
            outcome.replaced.is_some()
        };

        if replaced {
            self.metrics.producer_replaced();
        }
        info!(conn_id = %conn_id, session_id = %code, role = %role, "Peer joined session");
        RelayOutcome::Handled
    }

    async fn leave(&self, conn_id: ConnectionId) -> RelayOutcome {
        let binding = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let binding = state.registry.unbind(&mut state.sessions, &conn_id);
            if let Some(binding) = &binding {
                let mut out = vec![Delivery::Send(
                    conn_id,
                    OutboundMessage::Left {
                        session_id: binding.session.clone(),
                    },
                )];
                out.extend(departure(state, conn_id, binding));
                self.dispatch(out);
            }
            binding
        };

        if let Some(binding) = binding {
            info!(
                conn_id = %conn_id,
                session_id = %binding.session,
                role = %binding.role,
                "Peer left session"
            );
        }
        RelayOutcome::Handled
    }

    async fn frame(
        &self,
        conn_id: ConnectionId,
        raw_session: &str,
        payload: FramePayload,
        metadata: Option<serde_json::Value>,
    ) -> RelayOutcome {
        let code = match SessionCode::parse(raw_session) {
            Ok(code) => code,
            Err(e) => return RelayOutcome::Rejected(e),
        };

        let (sequence, delivered) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;

            let expected = Binding {
                session: code.clone(),
                role: PeerRole::Producer,
            };
            let holds_slot = state
                .sessions
                .get(&code)
                .is_ok_and(|s| s.producer() == Some(conn_id));
            if state.registry.binding(&conn_id) != Some(expected) || !holds_slot {
                drop(guard);
                warn!(
                    conn_id = %conn_id,
                    session_id = %code,
                    "Frame from a connection that is not the session producer, dropping"
                );
                return RelayOutcome::Dropped {
                    reason: "sender is not the session producer",
                };
            }

            let now = Utc::now();
            let session = match state.sessions.get_mut(&code) {
                Ok(session) => session,
                Err(e) => return RelayOutcome::Rejected(e),
            };
            let sequence = session.record_frame(payload.clone(), metadata.clone(), now);
            let message = OutboundMessage::Frame {
                session_id: code.clone(),
                sequence,
                payload,
                metadata,
                received_at: now,
                catch_up: false,
            };
            let deliveries: Vec<Delivery> = session
                .consumers()
                .iter()
                .filter(|id| **id != conn_id)
                .map(|id| Delivery::Send(*id, message.clone()))
                .collect();
            let delivered = deliveries.len();
            self.dispatch(deliveries);
            (sequence, delivered)
        };

        self.metrics.frame_relayed();
        if self.frame_log_interval != 0 && sequence % self.frame_log_interval == 0 {
            info!(
                session_id = %code,
                sequence,
                consumers = delivered,
                "Relaying frames"
            );
        }
        RelayOutcome::Handled
    }

    async fn signal(
        &self,
        conn_id: ConnectionId,
        kind: SignalKind,
        to: ConnectionId,
        payload: serde_json::Value,
    ) -> RelayOutcome {
        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            if let Some(binding) = state.registry.binding(&conn_id) {
                state.sessions.touch(&binding.session, Utc::now());
            }
        }

        if to == conn_id || !self.pool.is_live(&to) {
            debug!(from = %conn_id, to = %to, ?kind, "Signal target not connected, dropping");
            return RelayOutcome::Dropped {
                reason: "signal target is not connected",
            };
        }

        let failed = self.dispatch(vec![Delivery::Send(
            to,
            OutboundMessage::signal(kind, conn_id, payload),
        )]);
        if failed > 0 {
            return RelayOutcome::Dropped {
                reason: "signal target queue is full",
            };
        }

        self.metrics.signal_relayed();
        debug!(from = %conn_id, to = %to, ?kind, "Signal relayed");
        RelayOutcome::Handled
    }

    /// Pushes deliveries onto recipient queues. Returns how many failed.
    pub(crate) fn dispatch(&self, deliveries: Vec<Delivery>) -> usize {
        let mut failed = 0usize;
        for delivery in deliveries {
            match delivery {
                Delivery::Send(id, message) => match self.pool.get(&id) {
                    Some(handle) => {
                        if handle.send(message).is_err() {
                            failed += 1;
                        }
                    }
                    None => failed += 1,
                },
                Delivery::Close(id) => {
                    if let Some(handle) = self.pool.get(&id) {
                        handle.force_close();
                    }
                }
            }
        }
        if failed > 0 {
            debug!(failed, "Some deliveries were dropped");
            self.metrics.messages_dropped(failed as u64);
        }
        failed
    }

    /// Creates an empty session.
    pub async fn create_session(&self) -> AppResult<SessionSnapshot> {
        let snapshot = {
            let mut state = self.state.lock().await;
            let code = state.sessions.create_session()?;
            state.sessions.get(&code)?.snapshot()
        };
        self.metrics.session_created();
        info!(session_id = %snapshot.id, "Session created");
        Ok(snapshot)
    }

    /// Looks up a session by a user-typed id.
    pub async fn get_session(&self, raw: &str) -> AppResult<SessionSnapshot> {
        let code = SessionCode::parse(raw)?;
        let state = self.state.lock().await;
        Ok(state.sessions.get(&code)?.snapshot())
    }

    /// All sessions plus connection totals.
    pub async fn list_sessions(&self) -> SessionStats {
        let state = self.state.lock().await;
        SessionStats {
            session_count: state.sessions.len(),
            connection_count: self.pool.connection_count(),
            sessions: state.sessions.snapshots(),
        }
    }

    /// Number of sessions in the store.
    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    /// Sessions idle for longer than `idle` as of `now`.
    pub async fn scan_expired(
        &self,
        now: DateTime<Utc>,
        idle: chrono::Duration,
    ) -> Vec<SessionCode> {
        self.state.lock().await.sessions.expired_as_of(now, idle)
    }

    /// Removes a session if it is still idle, notifying its members.
    ///
    /// The idle check is repeated under the lock: a join that landed after
    /// the scan keeps the session alive. Returns the number of members
    /// notified, or `None` when nothing was removed.
    pub async fn expire_session(
        &self,
        code: &SessionCode,
        now: DateTime<Utc>,
        idle: chrono::Duration,
    ) -> Option<usize> {
        let notified = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let session = state.sessions.get(code).ok()?;
            let cutoff = now.checked_sub_signed(idle)?;
            if session.last_activity_at >= cutoff {
                debug!(session_id = %code, "Session became active again, keeping it");
                return None;
            }
            let members = state.registry.connections_in_session(code, None);
            for member in &members {
                state.registry.unbind(&mut state.sessions, member);
            }
            state.sessions.remove_session(code);

            let notified = members.len();
            self.dispatch(
                members
                    .into_iter()
                    .map(|id| {
                        Delivery::Send(
                            id,
                            OutboundMessage::SessionExpired {
                                session_id: code.clone(),
                            },
                        )
                    })
                    .collect(),
            );
            notified
        };

        self.metrics.session_expired();

        info!(session_id = %code, notified, "Session expired");
        Some(notified)
    }
}

/// Deliveries for a successful bind.
fn join_fanout(
    state: &RoomState,
    conn_id: ConnectionId,
    code: &SessionCode,
    role: PeerRole,
    outcome: &BindOutcome,
) -> Vec<Delivery> {
    let mut out = Vec::new();
    let Ok(session) = state.sessions.get(code) else {
        return out;
    };

    let joined = OutboundMessage::Joined {
        session_id: code.clone(),
        connection_id: conn_id,
        role,
        producer_connected: session.producer().is_some(),
        consumer_count: session.consumer_count(),
    };
    let catch_up = session
        .last_frame()
        .filter(|_| role == PeerRole::Consumer)
        .map(|frame| OutboundMessage::Frame {
            session_id: code.clone(),
            sequence: frame.sequence,
            payload: frame.payload.clone(),
            metadata: frame.metadata.clone(),
            received_at: frame.received_at,
            catch_up: true,
        });

    let binding = Binding {
        session: code.clone(),
        role,
    };
    if outcome.is_rejoin(&binding) {
        out.push(Delivery::Send(conn_id, joined));
        if let Some(frame) = catch_up {
            out.push(Delivery::Send(conn_id, frame));
        }
        return out;
    }

    if let Some(previous) = &outcome.previous {
        out.extend(departure(state, conn_id, previous));
    }

    if let Some(old) = outcome.replaced {
        out.push(Delivery::Send(
            old,
            OutboundMessage::Replaced {
                session_id: code.clone(),
            },
        ));
        out.push(Delivery::Close(old));
    }

    out.push(Delivery::Send(conn_id, joined));

    match role {
        PeerRole::Producer => {
            for consumer in state.role_except(code, PeerRole::Consumer, conn_id) {
                out.push(Delivery::Send(
                    consumer,
                    OutboundMessage::ProducerConnected {
                        session_id: code.clone(),
                        producer_id: conn_id,
                    },
                ));
            }
        }
        PeerRole::Consumer => {
            if let Some(frame) = catch_up {
                out.push(Delivery::Send(conn_id, frame));
            }
            if let Some(producer) = session.producer().filter(|p| *p != conn_id) {
                out.push(Delivery::Send(
                    producer,
                    OutboundMessage::ConsumerJoined {
                        session_id: code.clone(),
                        consumer_id: conn_id,
                    },
                ));
            }
        }
    }

    if let Some(info) = state.room_info(code) {
        for member in state.members_except(code, conn_id) {
            out.push(Delivery::Send(member, info.clone()));
        }
    }

    out
}

/// Deliveries announcing that `conn_id` released `binding`.
fn departure(state: &RoomState, conn_id: ConnectionId, binding: &Binding) -> Vec<Delivery> {
    let code = &binding.session;
    let mut out = Vec::new();

    match binding.role {
        PeerRole::Producer => {
            for consumer in state.role_except(code, PeerRole::Consumer, conn_id) {
                out.push(Delivery::Send(
                    consumer,
                    OutboundMessage::ProducerDisconnected {
                        session_id: code.clone(),
                        producer_id: conn_id,
                    },
                ));
            }
        }
        PeerRole::Consumer => {
            for member in state.members_except(code, conn_id) {
                out.push(Delivery::Send(
                    member,
                    OutboundMessage::PeerLeft {
                        session_id: code.clone(),
                        connection_id: conn_id,
                        role: PeerRole::Consumer,
                    },
                ));
            }
        }
    }

    if let Some(info) = state.room_info(code) {
        for member in state.members_except(code, conn_id) {
            out.push(Delivery::Send(member, info.clone()));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::handle::ConnectionHandle;
    use bytes::Bytes;
    use camrelay_core::error::ErrorKind;
    use tokio::sync::mpsc;

    struct Peer {
        id: ConnectionId,
        handle: Arc<ConnectionHandle>,
        rx: mpsc::Receiver<OutboundMessage>,
    }

    impl Peer {
        fn drain(&mut self) -> Vec<OutboundMessage> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                out.push(msg);
            }
            out
        }
    }

    fn router() -> (Arc<RelayRouter>, Arc<ConnectionPool>) {
        let pool = Arc::new(ConnectionPool::new());
        let router = RelayRouter::new(
            &SessionConfig::default(),
            pool.clone(),
            Arc::new(EngineMetrics::new()),
        );
        (Arc::new(router), pool)
    }

    async fn peer(router: &RelayRouter, pool: &ConnectionPool) -> Peer {
        let (tx, rx) = mpsc::channel(64);
        let handle = Arc::new(ConnectionHandle::new(tx));
        pool.add(handle.clone());
        router.connect(handle.id).await;
        Peer {
            id: handle.id,
            handle,
            rx,
        }
    }

    fn join(code: &SessionCode, role: &str) -> InboundMessage {
        InboundMessage::Join {
            session_id: code.to_string(),
            role: role.to_string(),
        }
    }

    fn frame(code: &SessionCode, bytes: &'static [u8]) -> InboundMessage {
        InboundMessage::Frame {
            session_id: code.to_string(),
            payload: FramePayload::new(Bytes::from_static(bytes)),
            metadata: None,
        }
    }

    fn frames(messages: &[OutboundMessage]) -> Vec<(u64, bool)> {
        messages
            .iter()
            .filter_map(|m| match m {
                OutboundMessage::Frame {
                    sequence, catch_up, ..
                } => Some((*sequence, *catch_up)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_frame_relay_and_catch_up() {
        let (router, pool) = router();
        let code = router.create_session().await.unwrap().id;
        let mut p = peer(&router, &pool).await;
        let mut c1 = peer(&router, &pool).await;
        let mut c2 = peer(&router, &pool).await;

        assert!(router.route(p.id, join(&code, "producer")).await.is_handled());
        assert!(router.route(c1.id, join(&code, "consumer")).await.is_handled());
        p.drain();
        c1.drain();

        assert!(router.route(p.id, frame(&code, b"f1")).await.is_handled());
        assert_eq!(frames(&c1.drain()), vec![(1, false)]);
        assert!(frames(&p.drain()).is_empty());

        router.route(c2.id, join(&code, "consumer")).await;
        let c2_msgs = c2.drain();
        assert!(matches!(c2_msgs[0], OutboundMessage::Joined { producer_connected: true, .. }));
        assert_eq!(frames(&c2_msgs), vec![(1, true)]);

        let p_msgs = p.drain();
        assert!(p_msgs.iter().any(|m| matches!(
            m,
            OutboundMessage::ConsumerJoined { consumer_id, .. } if *consumer_id == c2.id
        )));
        c1.drain();

        router.route(p.id, frame(&code, b"f2")).await;
        assert_eq!(frames(&c1.drain()), vec![(2, false)]);
        assert_eq!(frames(&c2.drain()), vec![(2, false)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_catch_up_precedes_live_frames_under_contention() {
        for _ in 0..200 {
            let (router, pool) = router();
            let code = router.create_session().await.unwrap().id;
            let p = peer(&router, &pool).await;
            router.route(p.id, join(&code, "producer")).await;
            router.route(p.id, frame(&code, b"cached")).await;

            let mut c = peer(&router, &pool).await;
            let joining = tokio::spawn({
                let (router, code, id) = (router.clone(), code.clone(), c.id);
                async move { router.route(id, join(&code, "consumer")).await }
            });
            let sending = tokio::spawn({
                let (router, code, id) = (router.clone(), code.clone(), p.id);
                async move { router.route(id, frame(&code, b"live")).await }
            });
            assert!(joining.await.unwrap().is_handled());
            assert!(sending.await.unwrap().is_handled());

            let received = frames(&c.drain());
            assert!(matches!(received.first(), Some((_, true))), "{received:?}");
            assert!(received[1..].iter().all(|(_, catch_up)| !catch_up));
            assert!(received.windows(2).all(|w| w[0].0 < w[1].0));
        }
    }

    #[tokio::test]
    async fn test_frame_log_interval_zero_still_relays() {
        let pool = Arc::new(ConnectionPool::new());
        let config = SessionConfig {
            frame_log_interval: 0,
            ..SessionConfig::default()
        };
        let router = RelayRouter::new(&config, pool.clone(), Arc::new(EngineMetrics::new()));
        let code = router.create_session().await.unwrap().id;
        let p = peer(&router, &pool).await;
        let mut c = peer(&router, &pool).await;
        router.route(p.id, join(&code, "producer")).await;
        router.route(c.id, join(&code, "consumer")).await;
        c.drain();

        for _ in 0..3 {
            assert!(router.route(p.id, frame(&code, b"f")).await.is_handled());
        }
        assert_eq!(frames(&c.drain()), vec![(1, false), (2, false), (3, false)]);
    }

    #[tokio::test]
    async fn test_expire_session_with_unrepresentable_idle() {
        let (router, pool) = router();
        let code = router.create_session().await.unwrap().id;
        let mut c = peer(&router, &pool).await;
        router.route(c.id, join(&code, "consumer")).await;
        c.drain();

        let now = Utc::now();
        assert!(router.scan_expired(now, chrono::Duration::MAX).await.is_empty());
        assert_eq!(
            router.expire_session(&code, now, chrono::Duration::MAX).await,
            None
        );
        assert!(router.get_session(code.as_str()).await.is_ok());
        assert!(c.drain().is_empty());
    }

    #[tokio::test]
    async fn test_producer_replacement() {
        let (router, pool) = router();
        let code = router.create_session().await.unwrap().id;
        let mut p1 = peer(&router, &pool).await;
        let mut p2 = peer(&router, &pool).await;
        let mut c = peer(&router, &pool).await;

        router.route(p1.id, join(&code, "producer")).await;
        router.route(c.id, join(&code, "consumer")).await;
        p1.drain();
        c.drain();

        router.route(p2.id, join(&code, "sender")).await;

        let p1_msgs = p1.drain();
        assert!(matches!(p1_msgs.as_slice(), [OutboundMessage::Replaced { .. }]));
        assert!(p1.handle.close_token().is_cancelled());

        let p2_msgs = p2.drain();
        assert!(matches!(
            p2_msgs[0],
            OutboundMessage::Joined { role: PeerRole::Producer, consumer_count: 1, .. }
        ));
        assert!(c.drain().iter().any(|m| matches!(
            m,
            OutboundMessage::ProducerConnected { producer_id, .. } if *producer_id == p2.id
        )));

        let snapshot = router.get_session(code.as_str()).await.unwrap();
        assert_eq!(snapshot.producer_id, Some(p2.id));

        // The evicted producer's own disconnect must not clear the new slot.
        assert!(router.disconnect(p1.id).await.is_none());
        assert!(c.drain().is_empty());
        let snapshot = router.get_session(code.as_str()).await.unwrap();
        assert_eq!(snapshot.producer_id, Some(p2.id));
    }

    #[tokio::test]
    async fn test_concurrent_producer_joins_leave_one_producer() {
        let (router, pool) = router();
        let code = router.create_session().await.unwrap().id;

        let mut peers = Vec::new();
        for _ in 0..16 {
            peers.push(peer(&router, &pool).await);
        }

        let mut tasks = Vec::new();
        for p in &peers {
            let router = router.clone();
            let id = p.id;
            let msg = join(&code, "producer");
            tasks.push(tokio::spawn(async move { router.route(id, msg).await }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_handled());
        }

        let alive: Vec<_> = peers.iter().filter(|p| p.handle.is_alive()).collect();
        assert_eq!(alive.len(), 1);
        let snapshot = router.get_session(code.as_str()).await.unwrap();
        assert_eq!(snapshot.producer_id, Some(alive[0].id));
    }

    #[tokio::test]
    async fn test_frame_from_consumer_is_dropped() {
        let (router, pool) = router();
        let code = router.create_session().await.unwrap().id;
        let mut p = peer(&router, &pool).await;
        let mut c = peer(&router, &pool).await;
        router.route(p.id, join(&code, "producer")).await;
        router.route(c.id, join(&code, "consumer")).await;
        p.drain();
        c.drain();

        let outcome = router.route(c.id, frame(&code, b"x")).await;
        assert!(matches!(outcome, RelayOutcome::Dropped { .. }));
        assert!(p.drain().is_empty());
        assert!(c.drain().is_empty());

        let snapshot = router.get_session(code.as_str()).await.unwrap();
        assert_eq!(snapshot.frame_sequence, 0);
        assert!(!snapshot.has_cached_frame);
    }

    #[tokio::test]
    async fn test_frame_for_other_session_is_dropped() {
        let (router, pool) = router();
        let mine = router.create_session().await.unwrap().id;
        let other = router.create_session().await.unwrap().id;
        let p = peer(&router, &pool).await;
        router.route(p.id, join(&mine, "producer")).await;

        let outcome = router.route(p.id, frame(&other, b"x")).await;
        assert!(matches!(outcome, RelayOutcome::Dropped { .. }));
        let snapshot = router.get_session(other.as_str()).await.unwrap();
        assert_eq!(snapshot.frame_sequence, 0);
    }

    #[tokio::test]
    async fn test_producer_disconnect_notifies_each_consumer_once() {
        let (router, pool) = router();
        let code = router.create_session().await.unwrap().id;
        let p = peer(&router, &pool).await;
        let mut c1 = peer(&router, &pool).await;
        let mut c2 = peer(&router, &pool).await;
        router.route(p.id, join(&code, "producer")).await;
        router.route(c1.id, join(&code, "consumer")).await;
        router.route(c2.id, join(&code, "consumer")).await;
        c1.drain();
        c2.drain();

        assert!(router.disconnect(p.id).await.is_some());
        assert!(router.disconnect(p.id).await.is_none());

        for c in [&mut c1, &mut c2] {
            let msgs = c.drain();
            let count = msgs
                .iter()
                .filter(|m| matches!(m, OutboundMessage::ProducerDisconnected { .. }))
                .count();
            assert_eq!(count, 1);
            assert!(msgs.iter().any(|m| matches!(
                m,
                OutboundMessage::RoomInfo { producer_connected: false, consumer_count: 2, .. }
            )));
        }

        let snapshot = router.get_session(code.as_str()).await.unwrap();
        assert!(!snapshot.producer_connected);
        assert_eq!(snapshot.consumer_count, 2);
    }

    #[tokio::test]
    async fn test_consumer_leave() {
        let (router, pool) = router();
        let code = router.create_session().await.unwrap().id;
        let mut p = peer(&router, &pool).await;
        let mut c = peer(&router, &pool).await;
        router.route(p.id, join(&code, "producer")).await;
        router.route(c.id, join(&code, "viewer")).await;
        p.drain();
        c.drain();

        assert!(router.route(c.id, InboundMessage::Leave).await.is_handled());
        assert!(matches!(c.drain().as_slice(), [OutboundMessage::Left { .. }]));
        let p_msgs = p.drain();
        assert!(p_msgs.iter().any(|m| matches!(
            m,
            OutboundMessage::PeerLeft { connection_id, role: PeerRole::Consumer, .. } if *connection_id == c.id
        )));

        // Leaving again, or disconnecting afterwards, is a no-op.
        router.route(c.id, InboundMessage::Leave).await;
        assert!(c.drain().is_empty());
        assert!(router.disconnect(c.id).await.is_none());
        assert!(p.drain().is_empty());
    }

    #[tokio::test]
    async fn test_join_errors() {
        let (router, pool) = router();
        let code = router.create_session().await.unwrap().id;
        let c = peer(&router, &pool).await;

        match router.route(c.id, join(&code, "admin")).await {
            RelayOutcome::Rejected(e) => assert_eq!(e.kind, ErrorKind::Validation),
            other => panic!("unexpected {other:?}"),
        }
        match router.route(c.id, join(&code, "nonsense")).await {
            RelayOutcome::Rejected(e) => assert_eq!(e.kind, ErrorKind::Validation),
            other => panic!("unexpected {other:?}"),
        }
        let missing = InboundMessage::Join {
            session_id: "zzz-999".to_string(),
            role: "consumer".to_string(),
        };
        match router.route(c.id, missing).await {
            RelayOutcome::Rejected(e) => assert_eq!(e.kind, ErrorKind::NotFound),
            other => panic!("unexpected {other:?}"),
        }
        let snapshot = router.get_session(code.as_str()).await.unwrap();
        assert_eq!(snapshot.consumer_count, 0);
    }

    #[tokio::test]
    async fn test_join_normalizes_session_id() {
        let (router, pool) = router();
        let code = router.create_session().await.unwrap().id;
        let c = peer(&router, &pool).await;
        let typed = InboundMessage::Join {
            session_id: format!("  {}  ", code.as_str().to_lowercase()),
            role: "consumer".to_string(),
        };
        assert!(router.route(c.id, typed).await.is_handled());
    }

    #[tokio::test]
    async fn test_signal_routing() {
        let (router, pool) = router();
        let code = router.create_session().await.unwrap().id;
        let p = peer(&router, &pool).await;
        let mut c = peer(&router, &pool).await;
        router.route(p.id, join(&code, "producer")).await;
        router.route(c.id, join(&code, "consumer")).await;
        c.drain();

        let offer = InboundMessage::SignalOffer {
            to: c.id,
            payload: serde_json::json!({"type": "offer", "sdp": "v=0"}),
        };
        assert!(router.route(p.id, offer).await.is_handled());
        match c.drain().as_slice() {
            [OutboundMessage::SignalOffer { from, payload }] => {
                assert_eq!(*from, p.id);
                assert_eq!(payload["sdp"], "v=0");
            }
            other => panic!("unexpected {other:?}"),
        }

        let stray = InboundMessage::SignalIce {
            to: ConnectionId::new(),
            payload: serde_json::json!({}),
        };
        assert!(matches!(
            router.route(p.id, stray).await,
            RelayOutcome::Dropped { .. }
        ));
    }

    #[tokio::test]
    async fn test_heartbeat_ping() {
        let (router, pool) = router();
        let mut c = peer(&router, &pool).await;
        router.route(c.id, InboundMessage::HeartbeatPing).await;
        assert!(matches!(
            c.drain().as_slice(),
            [OutboundMessage::HeartbeatPong { .. }]
        ));
    }

    #[tokio::test]
    async fn test_expire_session_notifies_and_removes() {
        let (router, pool) = router();
        let code = router.create_session().await.unwrap().id;
        let mut p = peer(&router, &pool).await;
        let mut c = peer(&router, &pool).await;
        router.route(p.id, join(&code, "producer")).await;
        router.route(c.id, join(&code, "consumer")).await;
        p.drain();
        c.drain();

        let idle = chrono::Duration::seconds(3600);
        let later = Utc::now() + idle + chrono::Duration::seconds(1);
        assert_eq!(router.scan_expired(later, idle).await, vec![code.clone()]);
        assert_eq!(router.expire_session(&code, later, idle).await, Some(2));

        for peer in [&mut p, &mut c] {
            assert!(matches!(
                peer.drain().as_slice(),
                [OutboundMessage::SessionExpired { .. }]
            ));
        }
        let err = router.get_session(code.as_str()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        // Late join fails cleanly; late disconnect sends nothing.
        assert!(matches!(
            router.route(c.id, join(&code, "consumer")).await,
            RelayOutcome::Rejected(_)
        ));
        assert!(router.disconnect(p.id).await.is_none());
        assert!(c.drain().is_empty());
    }

    #[tokio::test]
    async fn test_expire_skips_recently_touched_session() {
        let (router, pool) = router();
        let code = router.create_session().await.unwrap().id;
        let c = peer(&router, &pool).await;

        let idle = chrono::Duration::seconds(60);
        let now = Utc::now() + chrono::Duration::seconds(120);
        assert_eq!(router.scan_expired(now, idle).await.len(), 1);

        // Activity between scan and removal, stamped after the scan time.
        {
            let mut state = router.state.lock().await;
            state.sessions.touch(&code, now);
        }
        assert_eq!(router.expire_session(&code, now, idle).await, None);
        assert!(router.route(c.id, join(&code, "consumer")).await.is_handled());
    }

    #[tokio::test]
    async fn test_list_sessions() {
        let (router, pool) = router();
        router.create_session().await.unwrap();
        router.create_session().await.unwrap();
        let _c = peer(&router, &pool).await;

        let stats = router.list_sessions().await;
        assert_eq!(stats.session_count, 2);
        assert_eq!(stats.connection_count, 1);
        assert_eq!(stats.sessions.len(), 2);
    }
}
