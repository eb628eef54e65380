//! Demo API: an echo endpoint behind the websocket stage, plus health.

pub mod handlers;

use axum::Router;
use axum::routing::get;

use crate::ws::WebSocketLayer;

/// Builds the demo router. Only `/ws` sits behind `layer`.
pub fn build_router(layer: WebSocketLayer) -> Router {
    Router::new()
        .route("/ws", get(handlers::echo::echo_handler).layer(layer))
        .route("/health", get(handlers::system::health_handler))
}
