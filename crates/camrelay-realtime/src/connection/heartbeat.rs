//! Idle-connection monitor for WebSocket keepalive.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use super::handle::ConnectionHandle;

/// Heartbeat configuration
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// How often to check
    pub check_interval: Duration,
    /// Inbound silence after which the connection is closed
    pub idle_timeout: Duration,
}

/// Run the heartbeat loop for a connection.
///
/// Clients keep themselves alive with `heartbeat-ping` or any other
/// traffic. A connection silent for longer than the timeout is force
/// closed, which ends the transport task and triggers the usual
/// disconnect cleanup.
pub async fn run_heartbeat(handle: Arc<ConnectionHandle>, config: HeartbeatConfig) {
    let mut interval = time::interval(config.check_interval);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        interval.tick().await;

        if !handle.is_alive() {
            break;
        }

        if let Ok(idle) = handle.idle_for().await.to_std() {
            if idle > config.idle_timeout {
                tracing::warn!(
                    conn_id = %handle.id,
                    idle_secs = idle.as_secs(),
                    "Connection heartbeat timeout"
                );
                handle.force_close();
                break;
            }
        }
    }

    tracing::debug!(conn_id = %handle.id, "Heartbeat loop ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_idle_connection_is_closed() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = Arc::new(ConnectionHandle::new(tx));
        *handle.last_activity.write().await = Utc::now() - chrono::Duration::seconds(120);

        let config = HeartbeatConfig {
            check_interval: Duration::from_millis(10),
            idle_timeout: Duration::from_secs(60),
        };
        let token = handle.close_token();
        time::timeout(Duration::from_secs(2), run_heartbeat(handle.clone(), config))
            .await
            .expect("heartbeat loop should end");
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_loop_ends_when_connection_dies() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = Arc::new(ConnectionHandle::new(tx));
        handle.mark_dead();

        let config = HeartbeatConfig {
            check_interval: Duration::from_millis(10),
            idle_timeout: Duration::from_secs(60),
        };
        time::timeout(Duration::from_secs(2), run_heartbeat(handle.clone(), config))
            .await
            .expect("heartbeat loop should end");
        assert!(!handle.close_token().is_cancelled());
    }
}
