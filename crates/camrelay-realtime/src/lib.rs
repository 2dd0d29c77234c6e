//! # camrelay-realtime
//!
//! Session relay engine for camrelay. Provides:
//!
//! - WebSocket connection handles, pool and heartbeat monitoring
//! - The session store and the role-aware connection registry
//! - Relay routing for frames and WebRTC signaling
//! - Idle-session reaping
//! - Wire message types and validation

pub mod connection;
pub mod message;
pub mod metrics;
pub mod relay;
pub mod room;
pub mod server;
pub mod session;

pub use connection::manager::ConnectionManager;
pub use relay::router::{RelayOutcome, RelayRouter};
pub use server::RealtimeEngine;
pub use session::reaper::SessionReaper;
