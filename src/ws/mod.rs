//! WebSocket layer: upgrade negotiation, the deferred handshake, and the
//! acceptor shared by one pipeline stage.
//!
//! ```no_run
//! use axum::{Router, response::IntoResponse, routing::get};
//! use deferred_ws::ws::{WebSocketOptions, WsContext, websocket};
//!
//! async fn live(ctx: WsContext) -> impl IntoResponse {
//!     let Some(_socket) = ctx.ws().await else {
//!         return "This is a websocket endpoint";
//!     };
//!     // Drive the socket here; this return value is never sent.
//!     ""
//! }
//!
//! # fn build() -> Result<Router, deferred_ws::error::WsError> {
//! let app = Router::new()
//!     .route("/live", get(live))
//!     .layer(websocket(WebSocketOptions::default())?);
//! # Ok(app)
//! # }
//! ```

pub mod acceptor;
pub mod capability;
pub mod layer;
pub mod negotiate;
pub mod options;

pub use acceptor::{HandshakeHead, PendingUpgrade, WebSocket, WsServer};
pub use capability::{WsContext, WsHandle};
pub use layer::{WebSocketLayer, WebSocketService, websocket};
pub use options::{AcceptorOptions, WebSocketOptions};
