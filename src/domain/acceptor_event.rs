//! Notifications emitted by the WebSocket acceptor.
//!
//! Every completed handshake publishes an [`AcceptorEvent::Connection`] and
//! every rejected handshake an [`AcceptorEvent::HandshakeFailed`] through the
//! acceptor's [`super::EventBus`]. Listeners observe upgrades made through the
//! per-request capability exactly as if the acceptor had accepted them itself.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ConnectionId;

/// Event published by a [`crate::ws::WsServer`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AcceptorEvent {
    /// A handshake completed and a socket was handed to the handler.
    Connection {
        /// Identifier assigned to the new connection.
        connection_id: ConnectionId,
        /// Request path the upgrade was made on.
        path: String,
        /// Method of the upgrade request.
        method: String,
        /// Headers of the upgrade request, repeated values joined with `, `.
        headers: BTreeMap<String, String>,
        /// Negotiated subprotocol, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        protocol: Option<String>,
        /// Time the socket became available.
        timestamp: DateTime<Utc>,
    },

    /// A handshake was requested but could not be completed.
    HandshakeFailed {
        /// Request path the upgrade was attempted on.
        path: String,
        /// Human-readable failure reason.
        reason: String,
        /// Time of the failure.
        timestamp: DateTime<Utc>,
    },
}

impl AcceptorEvent {
    /// Returns the request path this event relates to.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Connection { path, .. } | Self::HandshakeFailed { path, .. } => path,
        }
    }

    /// Returns the event type as a static string.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::HandshakeFailed { .. } => "handshake_failed",
        }
    }
}
