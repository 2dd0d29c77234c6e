//! camrelay server: session pairing and frame/signaling relay.
//!
//! Main entry point that wires all crates together and starts the server.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use camrelay_api::{AppState, build_router};
use camrelay_core::config::AppConfig;
use camrelay_core::error::AppError;
use camrelay_realtime::server::RealtimeEngine;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "camrelay-server", version, about = "Camera session relay server")]
struct Args {
    /// Configuration overlay to load from `config/{env}.toml`.
    #[arg(long, env = "CAMRELAY_ENV", default_value = "development")]
    env: String,

    /// Override the listen port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match AppConfig::load(&args.env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting camrelay");

    // ── Step 1: Relay engine ─────────────────────────────────────
    let engine = RealtimeEngine::new(config.realtime.clone(), &config.session);
    let reaper = Arc::clone(&engine.reaper);

    // ── Step 2: Background reaper ────────────────────────────────
    let shutdown_rx = engine.shutdown_receiver();
    let reaper_handle = tokio::spawn(async move {
        reaper.run(shutdown_rx).await;
    });

    // ── Step 3: HTTP server ──────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    let state = AppState::new(config, engine);
    let realtime = Arc::clone(&state.realtime);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;

    tracing::info!(addr = %addr, "camrelay listening");

    let shutdown_engine = Arc::clone(&realtime);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received");
            // Open sockets keep the server alive until they close.
            if let Err(e) = shutdown_engine.shutdown().await {
                tracing::error!(error = %e, "Engine shutdown failed");
            }
        })
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    if tokio::time::timeout(grace, reaper_handle).await.is_err() {
        tracing::warn!("Reaper did not stop within the grace period");
    }

    tracing::info!("camrelay stopped");
    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
