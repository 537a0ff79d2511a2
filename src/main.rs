//! chat-hub server entry point.
//!
//! Starts the room hub and the Axum HTTP server with the WebSocket endpoint.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use chat_hub::config::ChatConfig;
use chat_hub::room::{LogTracer, NoopTracer, Tracer};
use chat_hub::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = ChatConfig::from_env()?;
    tracing::info!(
        addr = %config.listen_addr,
        outbox_capacity = config.outbox_capacity,
        overflow = %config.overflow,
        "starting chat-hub"
    );

    let tracer: Arc<dyn Tracer> = if config.trace_enabled {
        Arc::new(LogTracer)
    } else {
        Arc::new(NoopTracer)
    };

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    server::serve(listener, config, tracer, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    })
    .await?;

    Ok(())
}
