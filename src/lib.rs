//! # deferred-ws
//!
//! Tower middleware that lets any axum route upgrade its request to a
//! WebSocket on demand.
//!
//! The [`ws::websocket`] factory builds one stage owning one acceptor. For
//! every request the stage checks the `Upgrade` header and attaches a
//! [`ws::WsContext`]. Handlers call [`ws::WsContext::ws`] unconditionally:
//! plain requests get `None` and respond as usual, upgrade requests get the
//! handshake performed right then, with the handler's own response
//! suppressed in favor of `101 Switching Protocols`.
//!
//! ## Architecture
//!
//! ```text
//! TransportServer (transport/)
//!     │   └── shim: re-routes upgrade events when delivery = Event
//!     │
//!     ├── WebSocketLayer (ws/layer)      negotiate, attach WsContext
//!     │       │
//!     │       └── handler ── ctx.ws() ── WsServer (ws/acceptor)
//!     │                                      │
//!     │                                      └── EventBus (domain/)
//!     └── Router
//! ```

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod transport;
pub mod ws;

pub use error::{HandshakeError, WsError};
pub use ws::{WebSocketLayer, WebSocketOptions, WsContext, websocket};
