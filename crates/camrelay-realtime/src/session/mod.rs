//! Session records, the session store, and the idle-session reaper.

pub mod model;
pub mod reaper;
pub mod store;

pub use model::{CachedFrame, Session, SessionSnapshot, SessionStats};
pub use reaper::SessionReaper;
pub use store::SessionStore;
