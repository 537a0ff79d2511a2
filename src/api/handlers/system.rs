//! System endpoints: health check and room statistics.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::error::{ChatError, ErrorResponse};
use crate::room::RoomStats;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
}

/// `GET /health` — Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, and current timestamp.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// `GET /room/stats` — Current room membership and delivery counters.
///
/// # Errors
///
/// Returns [`ChatError::RoomUnavailable`] if the room hub has stopped.
#[utoipa::path(
    get,
    path = "/room/stats",
    tag = "Room",
    summary = "Room statistics",
    description = "Returns the number of connected members and the hub's delivery counters.",
    responses(
        (status = 200, description = "Current counters", body = RoomStats),
        (status = 503, description = "Room hub is not running", body = ErrorResponse),
    )
)]
pub async fn room_stats_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ChatError> {
    let stats = state.room.stats().await?;
    Ok((StatusCode::OK, Json(stats)))
}

/// System routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/room/stats", get(room_stats_handler))
}
