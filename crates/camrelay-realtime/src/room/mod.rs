//! Connection-to-session bindings and the lock-protected room state.

pub mod registry;
pub mod state;

pub use registry::{BindOutcome, Binding, ConnectionRecord, ConnectionRegistry};
pub use state::RoomState;
