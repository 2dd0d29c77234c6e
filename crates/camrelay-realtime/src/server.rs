//! Top-level relay engine that ties together all subsystems.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use camrelay_core::config::{RealtimeConfig, SessionConfig};
use camrelay_core::error::AppError;

use crate::connection::manager::ConnectionManager;
use crate::connection::pool::ConnectionPool;
use crate::metrics::EngineMetrics;
use crate::relay::router::RelayRouter;
use crate::session::reaper::SessionReaper;

/// Central engine that coordinates connections, routing and reaping.
#[derive(Clone)]
pub struct RealtimeEngine {
    /// Connection manager.
    pub connections: Arc<ConnectionManager>,
    /// Relay router, which also owns session state.
    pub router: Arc<RelayRouter>,
    /// Idle-session reaper.
    pub reaper: Arc<SessionReaper>,
    /// Metrics collector.
    pub metrics: Arc<EngineMetrics>,
    /// Flips to `true` once shutdown starts.
    shutdown_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for RealtimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEngine").finish()
    }
}

impl RealtimeEngine {
    /// Creates a new engine with all subsystems.
    pub fn new(realtime: RealtimeConfig, session: &SessionConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        let metrics = Arc::new(EngineMetrics::new());
        let pool = Arc::new(ConnectionPool::new());
        let router = Arc::new(RelayRouter::new(session, pool.clone(), metrics.clone()));
        let connections = Arc::new(ConnectionManager::new(
            realtime,
            pool,
            router.clone(),
            metrics.clone(),
        ));
        let reaper = Arc::new(SessionReaper::new(router.clone(), session));

        info!("Relay engine initialized");

        Self {
            connections,
            router,
            reaper,
            metrics,
            shutdown_tx,
        }
    }

    /// Receiver that background tasks such as the reaper stop on.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Initiates a graceful shutdown of the engine.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        info!("Shutting down relay engine");

        self.shutdown_tx.send_replace(true);
        self.connections.close_all().await;

        info!("Relay engine shut down");
        Ok(())
    }
}
