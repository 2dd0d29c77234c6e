//! Shared test helpers for integration tests.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use camrelay_api::{AppState, build_router};
use camrelay_core::config::AppConfig;
use camrelay_realtime::server::RealtimeEngine;

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// Shared state, for reaching into the engine
    pub state: AppState,
}

impl TestApp {
    /// Create a new test application with default configuration
    pub fn new() -> Self {
        let config = AppConfig::default();
        let engine = RealtimeEngine::new(config.realtime.clone(), &config.session);
        let state = AppState::new(config, engine);
        Self {
            router: build_router(state.clone()),
            state,
        }
    }

    /// Send a request through the router
    pub async fn request(&self, method: &str, path: &str) -> TestResponse {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::empty())
            .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("Failed to read body");

        let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

        TestResponse { status, body }
    }

    /// Create a session and return its id
    pub async fn create_session(&self) -> String {
        let response = self.request("POST", "/api/sessions").await;
        assert_eq!(response.status, StatusCode::CREATED);
        response.body["data"]["id"]
            .as_str()
            .expect("session id")
            .to_string()
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Parsed JSON body
    pub body: Value,
}
