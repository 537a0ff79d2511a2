//! Router assembly and server lifecycle.
//!
//! [`serve`] starts the room hub, mounts the HTTP and WebSocket routes and
//! runs until the supplied shutdown future completes. Shutdown stops the
//! hub as well, which closes every member's outbox so write pumps send a
//! close frame and finish.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::config::ChatConfig;
use crate::room::{Room, Tracer};
use crate::ws::handler::ws_handler;

/// Builds the full application router for the given state.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(api::build_router())
        .route("/room", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the room on `listener` until `shutdown` completes.
///
/// # Errors
///
/// Returns an I/O error if the HTTP server fails.
pub async fn serve<F>(
    listener: TcpListener,
    config: ChatConfig,
    tracer: Arc<dyn Tracer>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (room, hub) = Room::new(config.room_config(), tracer);

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let hub_task = tokio::spawn(hub.run_until(async move {
        // A dropped sender also means stop.
        let _ = stop_rx.wait_for(|stopped| *stopped).await;
    }));

    let app = build_app(AppState { room, config });

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("shutdown requested");
            let _ = stop_tx.send(true);
        })
        .await;

    if let Err(err) = hub_task.await {
        tracing::error!(error = %err, "room hub task failed");
    }

    result
}
