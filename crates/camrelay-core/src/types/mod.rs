//! Shared domain types: identifiers and roles.

pub mod id;
pub mod role;

pub use id::{ConnectionId, SessionCode};
pub use role::{ConnectionRole, PeerRole};
