//! Application state shared across all handlers and middleware.

use std::sync::Arc;
use std::time::Instant;

use camrelay_core::config::AppConfig;
use camrelay_realtime::server::RealtimeEngine;

/// Shared application state, cloned into every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<AppConfig>,
    /// Relay engine.
    pub realtime: Arc<RealtimeEngine>,
    /// Process start, for uptime reporting.
    pub started_at: Instant,
}

impl AppState {
    /// Builds state around an engine.
    pub fn new(config: AppConfig, realtime: RealtimeEngine) -> Self {
        Self {
            config: Arc::new(config),
            realtime: Arc::new(realtime),
            started_at: Instant::now(),
        }
    }
}
