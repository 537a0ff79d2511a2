//! Axum WebSocket upgrade handler.

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;

use super::connection::run_connection;
use crate::app_state::AppState;

/// `GET /room` — Upgrade HTTP connection to WebSocket and join the room.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let room = state.room.clone();
    let config = &state.config;

    ws.read_buffer_size(config.socket_buffer_size)
        .write_buffer_size(config.socket_buffer_size)
        .max_message_size(config.max_message_size)
        .on_failed_upgrade(|err| tracing::warn!(error = %err, "websocket upgrade failed"))
        .on_upgrade(move |socket| run_connection(socket, room))
}
