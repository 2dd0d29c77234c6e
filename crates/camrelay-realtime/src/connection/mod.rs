//! WebSocket connection management: lifecycle, pool, handles, heartbeat.

pub mod handle;
pub mod heartbeat;
pub mod manager;
pub mod pool;

pub use handle::{ConnectionHandle, SendError};
pub use manager::ConnectionManager;
pub use pool::ConnectionPool;
