//! Session lifecycle handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use camrelay_realtime::session::model::{SessionSnapshot, SessionStats};

use crate::dto::response::ApiResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/sessions
pub async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ApiResponse<SessionSnapshot>>), ApiError> {
    let session = state.realtime.router.create_session().await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(session))))
}

/// GET /api/sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<ApiResponse<SessionStats>> {
    Json(ApiResponse::ok(state.realtime.router.list_sessions().await))
}

/// GET /api/sessions/{id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SessionSnapshot>>, ApiError> {
    let session = state.realtime.router.get_session(&id).await?;
    Ok(Json(ApiResponse::ok(session)))
}
