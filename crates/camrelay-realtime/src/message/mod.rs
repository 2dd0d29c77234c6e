//! WebSocket message types, payload encoding, and validation.

pub mod payload;
pub mod types;
pub mod validator;

pub use payload::FramePayload;
pub use types::{InboundEnvelope, InboundMessage, OutboundMessage, SignalKind};
