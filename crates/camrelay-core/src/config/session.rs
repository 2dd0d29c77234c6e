//! Session lifecycle configuration.

use serde::{Deserialize, Serialize};

/// Session store and reaper settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Inactivity after which a session is reaped, in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
    /// Interval between reaper sweeps, in seconds.
    #[serde(default = "default_reap_interval")]
    pub reap_interval_seconds: u64,
    /// Attempts at drawing an unused session code before giving up.
    #[serde(default = "default_id_retry_budget")]
    pub id_retry_budget: u32,
    /// Log relay progress once every this many frames. `0` turns the
    /// progress log off.
    #[serde(default = "default_frame_log_interval")]
    pub frame_log_interval: u64,
}

impl SessionConfig {
    /// Idle threshold as a chrono duration.
    ///
    /// Values past what chrono can represent saturate to
    /// [`chrono::Duration::MAX`], which no session ever exceeds.
    pub fn idle_timeout(&self) -> chrono::Duration {
        i64::try_from(self.idle_timeout_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: default_idle_timeout(),
            reap_interval_seconds: default_reap_interval(),
            id_retry_budget: default_id_retry_budget(),
            frame_log_interval: default_frame_log_interval(),
        }
    }
}

fn default_idle_timeout() -> u64 {
    3600
}

fn default_reap_interval() -> u64 {
    300
}

fn default_id_retry_budget() -> u32 {
    32
}

fn default_frame_log_interval() -> u64 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_timeout_default() {
        assert_eq!(
            SessionConfig::default().idle_timeout(),
            chrono::Duration::seconds(3600)
        );
    }

    #[test]
    fn test_idle_timeout_saturates() {
        for seconds in [u64::MAX, i64::MAX as u64, 10_000_000_000_000] {
            let config = SessionConfig {
                idle_timeout_seconds: seconds,
                ..SessionConfig::default()
            };
            assert_eq!(config.idle_timeout(), chrono::Duration::MAX, "{seconds}");
        }
    }
}
