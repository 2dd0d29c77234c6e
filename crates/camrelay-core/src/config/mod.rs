//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section. Every field carries a serde default so the service starts
//! without any configuration file present.

pub mod app;
pub mod logging;
pub mod realtime;
pub mod session;

use serde::{Deserialize, Serialize};

pub use self::app::{CorsConfig, ServerConfig};
pub use self::logging::LoggingConfig;
pub use self::realtime::RealtimeConfig;
pub use self::session::SessionConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Real-time WebSocket settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Session lifecycle and reaper settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `CAMRELAY_`. A bare `PORT`
    /// variable, as injected by most hosting platforms, overrides
    /// `server.port`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("CAMRELAY")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Ok(port) = std::env::var("PORT") {
            let port: u16 = port
                .parse()
                .map_err(|_| AppError::configuration(format!("Invalid PORT value '{port}'")))?;
            builder = builder.set_override("server.port", i64::from(port))?;
        }

        let config = builder
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }

    /// Parse configuration from an in-memory TOML document.
    pub fn from_toml(source: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_toml("").expect("empty config");
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.session.idle_timeout_seconds, 3600);
        assert_eq!(config.session.reap_interval_seconds, 300);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [server]
            port = 9000

            [session]
            idle_timeout_seconds = 60
            "#,
        )
        .expect("partial config");

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.session.idle_timeout_seconds, 60);
        assert_eq!(config.session.reap_interval_seconds, 300);
        assert_eq!(config.realtime.channel_buffer_size, 256);
    }
}
