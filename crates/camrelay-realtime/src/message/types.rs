//! Inbound and outbound WebSocket message type definitions.
//!
//! Every message is a JSON object whose `type` field carries the
//! kebab-case event name. Older clients used `join-room`, `offer`,
//! `answer`, `ice-candidate`, `roomId`, `sdp` and `candidate`; those names
//! are accepted as aliases on input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use camrelay_core::types::{ConnectionId, PeerRole, SessionCode};

use super::payload::FramePayload;

/// Raw inbound message plus the optional acknowledgement id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEnvelope {
    /// When present, the server answers with an `ack` carrying this id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<String>,
    /// The event itself.
    #[serde(flatten)]
    pub message: InboundMessage,
}

/// Messages sent by a client to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InboundMessage {
    /// Join a session under a role.
    #[serde(alias = "join-room")]
    Join {
        /// Session code as typed by the user.
        #[serde(alias = "roomId")]
        session_id: String,
        /// `producer` or `consumer` (legacy `sender` / `viewer`).
        role: String,
    },
    /// Leave the current session without disconnecting.
    Leave,
    /// A media frame from the producer.
    Frame {
        /// Session the frame belongs to.
        #[serde(alias = "roomId")]
        session_id: String,
        /// Opaque frame bytes, base64 encoded.
        payload: FramePayload,
        /// Opaque client metadata (dimensions, codec, timestamps).
        #[serde(default)]
        metadata: Option<serde_json::Value>,
    },
    /// WebRTC offer for one peer.
    #[serde(alias = "offer")]
    SignalOffer {
        /// Target connection.
        to: ConnectionId,
        /// Session description, relayed verbatim.
        #[serde(alias = "sdp")]
        payload: serde_json::Value,
    },
    /// WebRTC answer for one peer.
    #[serde(alias = "answer")]
    SignalAnswer {
        /// Target connection.
        to: ConnectionId,
        /// Session description, relayed verbatim.
        #[serde(alias = "sdp")]
        payload: serde_json::Value,
    },
    /// ICE candidate for one peer.
    #[serde(alias = "ice-candidate")]
    SignalIce {
        /// Target connection.
        to: ConnectionId,
        /// Candidate, relayed verbatim.
        #[serde(alias = "candidate")]
        payload: serde_json::Value,
    },
    /// Application-level keepalive.
    HeartbeatPing,
}

impl InboundMessage {
    /// Event name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Leave => "leave",
            Self::Frame { .. } => "frame",
            Self::SignalOffer { .. } => "signal-offer",
            Self::SignalAnswer { .. } => "signal-answer",
            Self::SignalIce { .. } => "signal-ice",
            Self::HeartbeatPing => "heartbeat-ping",
        }
    }
}

/// The three signaling message flavours, which share routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// SDP offer.
    Offer,
    /// SDP answer.
    Answer,
    /// ICE candidate.
    Ice,
}

/// Messages sent by the server to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundMessage {
    /// Join accepted.
    Joined {
        /// Session joined.
        session_id: SessionCode,
        /// The joining connection's id, needed as a signaling address.
        connection_id: ConnectionId,
        /// Role granted.
        role: PeerRole,
        /// Whether a producer is bound right now.
        producer_connected: bool,
        /// Number of consumers bound right now.
        consumer_count: usize,
    },
    /// A producer joined (sent to consumers).
    ProducerConnected {
        /// Session.
        session_id: SessionCode,
        /// The producer's connection id.
        producer_id: ConnectionId,
    },
    /// A consumer joined (sent to the producer).
    ConsumerJoined {
        /// Session.
        session_id: SessionCode,
        /// The consumer's connection id.
        consumer_id: ConnectionId,
    },
    /// The producer left or disconnected (sent to consumers).
    ProducerDisconnected {
        /// Session.
        session_id: SessionCode,
        /// The departed producer.
        producer_id: ConnectionId,
    },
    /// A consumer left or disconnected (sent to the producer).
    PeerLeft {
        /// Session.
        session_id: SessionCode,
        /// The departed connection.
        connection_id: ConnectionId,
        /// Its role.
        role: PeerRole,
    },
    /// Explicit leave confirmed.
    Left {
        /// Session left.
        session_id: SessionCode,
    },
    /// Another connection took over the producer slot.
    Replaced {
        /// Session.
        session_id: SessionCode,
    },
    /// Membership snapshot.
    RoomInfo {
        /// Session.
        session_id: SessionCode,
        /// Whether a producer is bound.
        producer_connected: bool,
        /// Number of bound consumers.
        consumer_count: usize,
        /// Last activity timestamp.
        last_activity_at: DateTime<Utc>,
    },
    /// A relayed media frame.
    Frame {
        /// Session.
        session_id: SessionCode,
        /// Sequence number assigned by the server.
        sequence: u64,
        /// Opaque frame bytes, base64 encoded.
        payload: FramePayload,
        /// Metadata as sent by the producer.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
        /// When the server received the frame.
        received_at: DateTime<Utc>,
        /// True for the one-time delivery of the cached frame on join.
        catch_up: bool,
    },
    /// Relayed WebRTC offer.
    SignalOffer {
        /// Sender.
        from: ConnectionId,
        /// Payload, verbatim.
        payload: serde_json::Value,
    },
    /// Relayed WebRTC answer.
    SignalAnswer {
        /// Sender.
        from: ConnectionId,
        /// Payload, verbatim.
        payload: serde_json::Value,
    },
    /// Relayed ICE candidate.
    SignalIce {
        /// Sender.
        from: ConnectionId,
        /// Payload, verbatim.
        payload: serde_json::Value,
    },
    /// The session was reaped for inactivity.
    SessionExpired {
        /// Session.
        session_id: SessionCode,
    },
    /// Reply to `heartbeat-ping`.
    HeartbeatPong {
        /// Server time.
        timestamp: DateTime<Utc>,
    },
    /// Acknowledgement for an event that carried an `ack_id`.
    Ack {
        /// Echoed id.
        ack_id: String,
        /// Whether the event was accepted and routed.
        ok: bool,
        /// Failure reason.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Error reported to the sender only.
    Error {
        /// Error code.
        code: String,
        /// Error description.
        message: String,
    },
}

impl OutboundMessage {
    /// Builds a relayed signaling message.
    pub fn signal(kind: SignalKind, from: ConnectionId, payload: serde_json::Value) -> Self {
        match kind {
            SignalKind::Offer => Self::SignalOffer { from, payload },
            SignalKind::Answer => Self::SignalAnswer { from, payload },
            SignalKind::Ice => Self::SignalIce { from, payload },
        }
    }

    /// Builds an error message from an application error.
    pub fn from_error(err: &camrelay_core::AppError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.message.clone(),
        }
    }
}
