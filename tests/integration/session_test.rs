//! Integration tests for the session lifecycle and health endpoints.

mod helpers;

use axum::http::StatusCode;

#[tokio::test]
async fn test_root_banner() {
    let app = helpers::TestApp::new();
    let response = app.request("GET", "/").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert_eq!(response.body["message"], "Signaling server");
}

#[tokio::test]
async fn test_create_session_returns_empty_session() {
    let app = helpers::TestApp::new();
    let response = app.request("POST", "/api/sessions").await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["success"], true);

    let data = &response.body["data"];
    let id = data["id"].as_str().unwrap();
    assert_eq!(id.len(), 7);
    assert_eq!(&id[3..4], "-");
    assert_eq!(data["producer_connected"], false);
    assert_eq!(data["consumer_count"], 0);
    assert_eq!(data["frame_sequence"], 0);
    assert_eq!(data["created_at"], data["last_activity_at"]);
}

#[tokio::test]
async fn test_get_session_normalizes_id() {
    let app = helpers::TestApp::new();
    let id = app.create_session().await;

    let response = app
        .request("GET", &format!("/api/sessions/{}", id.to_lowercase()))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["id"], id.as_str());
}

#[tokio::test]
async fn test_get_unknown_session() {
    let app = helpers::TestApp::new();
    let response = app.request("GET", "/api/sessions/ZZZ-999").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn test_get_malformed_session_id() {
    let app = helpers::TestApp::new();
    let response = app.request("GET", "/api/sessions/not-a-code").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_list_sessions_with_stats() {
    let app = helpers::TestApp::new();
    app.create_session().await;
    app.create_session().await;

    let response = app.request("GET", "/api/sessions").await;

    assert_eq!(response.status, StatusCode::OK);
    let data = &response.body["data"];
    assert_eq!(data["session_count"], 2);
    assert_eq!(data["connection_count"], 0);
    assert_eq!(data["sessions"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_expired_session_is_gone() {
    let app = helpers::TestApp::new();
    let id = app.create_session().await;

    let later = seconds_from_now(3601);
    let report = app.state.realtime.reaper.sweep_at(later).await;
    assert_eq!(report.expired, 1);

    let response = app.request("GET", &format!("/api/sessions/{id}")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_check() {
    let app = helpers::TestApp::new();
    let response = app.request("GET", "/api/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_detailed_health_check() {
    let app = helpers::TestApp::new();
    app.create_session().await;

    let response = app.request("GET", "/api/health/detailed").await;

    assert_eq!(response.status, StatusCode::OK);
    let data = &response.body["data"];
    assert_eq!(data["sessions"], 1);
    assert_eq!(data["ws_connections"], 0);
    assert_eq!(data["metrics"]["sessions_created"], 1);
}

#[tokio::test]
async fn test_ws_route_requires_upgrade() {
    let app = helpers::TestApp::new();
    let response = app.request("GET", "/ws").await;

    assert!(
        response.status.is_client_error(),
        "Expected a 4xx without upgrade headers, got {}",
        response.status
    );
}

fn seconds_from_now(seconds: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now() + chrono::Duration::seconds(seconds)
}
