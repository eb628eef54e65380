//! deferred-ws echo server entry point.
//!
//! Serves `/ws` (echo over WebSocket, plain `400` otherwise) and `/health`.

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use deferred_ws::api;
use deferred_ws::config::WsConfig;
use deferred_ws::domain::AcceptorEvent;
use deferred_ws::transport::TransportServer;
use deferred_ws::ws::{WebSocketOptions, websocket};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = WsConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, delivery = ?config.delivery(), "starting deferred-ws");

    let server = TransportServer::new(config.delivery());
    let layer = websocket(WebSocketOptions {
        server: Some(server.clone()),
        acceptor: config.acceptor_options(),
        delivery: config.delivery(),
        no_server_workaround: config.no_server_workaround,
    })?;
    tokio::spawn(log_acceptor_events(layer.server().subscribe()));

    let app = api::build_router(layer)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(config.listen_addr).await?;
    server.serve(listener, app, shutdown_signal()).await?;

    tracing::info!("shutdown complete");
    Ok(())
}

/// Logs every acceptor notification as JSON.
async fn log_acceptor_events(mut events: broadcast::Receiver<AcceptorEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let json = serde_json::to_string(&event).unwrap_or_default();
                tracing::info!(event = %json, "acceptor event");
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(lagged = n, "acceptor event log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
