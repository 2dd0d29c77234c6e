//! # camrelay-api
//!
//! HTTP API layer for camrelay built on Axum.
//!
//! Provides the session lifecycle endpoints, health checks, the WebSocket
//! upgrade, middleware (CORS, request logging), DTOs, and error mapping.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
