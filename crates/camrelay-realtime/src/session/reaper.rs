//! Idle-session reaper: a periodic sweep over the session store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time;

use camrelay_core::config::SessionConfig;

use crate::relay::router::RelayRouter;

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions the scan flagged.
    pub scanned: usize,
    /// Sessions actually removed.
    pub expired: usize,
    /// Connections told their session expired.
    pub notified: usize,
}

/// Removes sessions whose last activity is older than the idle timeout.
#[derive(Debug)]
pub struct SessionReaper {
    /// Router owning the session state
    router: Arc<RelayRouter>,
    /// Time between sweeps
    interval: Duration,
    /// Idle threshold
    idle_timeout: chrono::Duration,
}

impl SessionReaper {
    /// Create a reaper from the session configuration
    pub fn new(router: Arc<RelayRouter>, config: &SessionConfig) -> Self {
        Self {
            router,
            interval: Duration::from_secs(config.reap_interval_seconds.max(1)),
            idle_timeout: config.idle_timeout(),
        }
    }

    /// Run one sweep as of `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let candidates = self.router.scan_expired(now, self.idle_timeout).await;
        let mut report = SweepReport {
            scanned: candidates.len(),
            ..SweepReport::default()
        };

        for code in &candidates {
            if let Some(notified) = self
                .router
                .expire_session(code, now, self.idle_timeout)
                .await
            {
                report.expired += 1;
                report.notified += notified;
            }
        }

        if report.expired > 0 {
            tracing::info!(
                expired = report.expired,
                notified = report.notified,
                "Reaped idle sessions"
            );
        }
        report
    }

    /// Sweep on a fixed interval until the cancel signal is received
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            idle_secs = self.idle_timeout.num_seconds(),
            "Session reaper started"
        );

        let mut ticker = time::interval(self.interval);
        // The first tick completes immediately; nothing can be idle yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        tracing::info!("Session reaper received shutdown signal");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.sweep_at(Utc::now()).await;
                }
            }
        }

        tracing::info!("Session reaper stopped");
    }
}
