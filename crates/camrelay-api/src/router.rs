//! Route definitions for the camrelay HTTP API.
//!
//! Session lifecycle and health routes are mounted under `/api`; the
//! WebSocket upgrade lives at `/ws`.

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(session_routes())
        .merge(health_routes());

    let cors = middleware::cors::build_cors_layer(&state.config.server.cors);

    Router::new()
        .route("/", get(handlers::health::root))
        .route("/ws", get(handlers::ws::ws_upgrade))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum_middleware::from_fn(middleware::logging::request_logging))
        .with_state(state)
}

/// Session lifecycle: create, list, get
fn session_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/sessions",
            post(handlers::session::create_session).get(handlers::session::list_sessions),
        )
        .route("/sessions/{id}", get(handlers::session::get_session))
}

/// Health: basic and detailed
fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/detailed", get(handlers::health::detailed_health))
}
