//! The long-lived WebSocket acceptor shared by one pipeline stage.
//!
//! [`WsServer`] never accepts on its own. It validates a handshake when asked,
//! builds the `101 Switching Protocols` reply, and turns the upgraded
//! connection into a [`WebSocket`] once hyper hands it over. Every outcome is
//! published on the acceptor's [`EventBus`].

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{
    CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_PROTOCOL,
    SEC_WEBSOCKET_VERSION, UPGRADE,
};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode, Uri};
use axum::response::Response;
use chrono::Utc;
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;
use tokio::sync::broadcast;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::{Role, WebSocketConfig};

use super::negotiate::WEBSOCKET_TOKEN;
use super::options::AcceptorOptions;
use crate::domain::{AcceptorEvent, ConnectionId, EventBus};
use crate::error::HandshakeError;

/// A server-side WebSocket over an upgraded hyper connection.
pub type WebSocket = WebSocketStream<TokioIo<Upgraded>>;

/// Protocol versions accepted in `Sec-WebSocket-Version`.
const SUPPORTED_VERSIONS: [&str; 2] = ["13", "8"];

/// Immutable snapshot of the request head a handshake is performed for.
#[derive(Debug, Clone)]
pub struct HandshakeHead {
    /// Request method.
    pub method: Method,
    /// Request URI.
    pub uri: Uri,
    /// Request headers.
    pub headers: HeaderMap,
}

impl HandshakeHead {
    /// Captures the head of `request`.
    #[must_use]
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
        }
    }

    /// Returns the request path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }
}

/// Shared handle to the acceptor. Cloning shares the same acceptor.
#[derive(Debug, Clone)]
pub struct WsServer {
    inner: Arc<Acceptor>,
}

#[derive(Debug)]
struct Acceptor {
    config: WebSocketConfig,
    protocols: Vec<String>,
    events: EventBus,
}

impl WsServer {
    /// Creates an acceptor from passthrough options.
    #[must_use]
    pub fn new(options: &AcceptorOptions) -> Self {
        Self {
            inner: Arc::new(Acceptor {
                config: options.socket_config(),
                protocols: options.protocols.clone(),
                events: EventBus::new(options.event_capacity),
            }),
        }
    }

    /// Subscribes to connection and handshake-failure notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AcceptorEvent> {
        self.inner.events.subscribe()
    }

    /// Returns the socket configuration applied to upgraded connections.
    #[must_use]
    pub fn config(&self) -> WebSocketConfig {
        self.inner.config
    }

    /// Returns the subprotocols this acceptor speaks.
    #[must_use]
    pub fn protocols(&self) -> &[String] {
        &self.inner.protocols
    }

    /// Returns `true` if both handles share the same acceptor.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Validates a handshake and builds the switching-protocols reply.
    ///
    /// Nothing is written to the connection here. Returns the reply the
    /// pipeline must send and the [`PendingUpgrade`] that completes once hyper
    /// has written it.
    ///
    /// # Errors
    ///
    /// Returns a [`HandshakeError`] if the request is not a valid WebSocket
    /// opening handshake or the connection cannot be upgraded.
    pub fn prepare(
        &self,
        head: &HandshakeHead,
        on_upgrade: Option<OnUpgrade>,
    ) -> Result<(Response, PendingUpgrade), HandshakeError> {
        if head.method != Method::GET {
            return Err(HandshakeError::MethodNotAllowed(head.method.clone()));
        }

        let key = head
            .headers
            .get(SEC_WEBSOCKET_KEY)
            .filter(|key| is_valid_key(key.as_bytes()))
            .ok_or(HandshakeError::InvalidKey)?;

        let version_ok = head
            .headers
            .get(SEC_WEBSOCKET_VERSION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| SUPPORTED_VERSIONS.contains(&v.trim()));
        if !version_ok {
            return Err(HandshakeError::UnsupportedVersion);
        }

        let on_upgrade = on_upgrade.ok_or(HandshakeError::UpgradeUnavailable)?;

        let accept = HeaderValue::from_str(&derive_accept_key(key.as_bytes()))
            .map_err(|_| HandshakeError::InvalidKey)?;
        let protocol = self.select_protocol(&head.headers);

        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
        let headers = response.headers_mut();
        headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
        headers.insert(UPGRADE, HeaderValue::from_static(WEBSOCKET_TOKEN));
        headers.insert(SEC_WEBSOCKET_ACCEPT, accept);
        if let Some(value) = protocol
            .as_deref()
            .and_then(|p| HeaderValue::from_str(p).ok())
        {
            headers.insert(SEC_WEBSOCKET_PROTOCOL, value);
        }

        let pending = PendingUpgrade {
            on_upgrade,
            protocol,
            head: head.clone(),
            server: self.clone(),
        };
        Ok((response, pending))
    }

    /// Logs a refused or broken handshake and publishes it to listeners.
    pub fn report_failure(&self, path: &str, error: &HandshakeError) {
        tracing::warn!(path, reason = %error, "websocket handshake failed");
        self.inner.events.publish(AcceptorEvent::HandshakeFailed {
            path: path.to_string(),
            reason: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Picks the subprotocol to echo back.
    ///
    /// With no configured protocols the client's first offer is accepted;
    /// otherwise the first client offer the server also speaks.
    fn select_protocol(&self, headers: &HeaderMap) -> Option<String> {
        let mut offered = headers
            .get_all(SEC_WEBSOCKET_PROTOCOL)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|p| !p.is_empty());

        if self.inner.protocols.is_empty() {
            return offered.next().map(str::to_string);
        }
        offered
            .find(|p| self.inner.protocols.iter().any(|s| s == p))
            .map(str::to_string)
    }
}

/// A validated handshake waiting for hyper to hand over the connection.
///
/// The connection is only handed over once the reply returned alongside it
/// has been written.
#[derive(Debug)]
pub struct PendingUpgrade {
    on_upgrade: OnUpgrade,
    protocol: Option<String>,
    head: HandshakeHead,
    server: WsServer,
}

impl PendingUpgrade {
    /// Returns the negotiated subprotocol.
    #[must_use]
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// Waits for the upgraded connection and wraps it as a server socket.
    ///
    /// Resolves `None` if the transport fails to hand the connection over;
    /// the failure is reported through the acceptor.
    pub async fn complete(self) -> Option<WebSocket> {
        let upgraded = match self.on_upgrade.await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                self.server
                    .report_failure(self.head.path(), &HandshakeError::Upgrade(e));
                return None;
            }
        };

        let socket = WebSocketStream::from_raw_socket(
            TokioIo::new(upgraded),
            Role::Server,
            Some(self.server.config()),
        )
        .await;

        let connection_id = ConnectionId::new();
        let path = self.head.path().to_string();
        tracing::debug!(%path, %connection_id, "websocket connection accepted");
        self.server.inner.events.publish(AcceptorEvent::Connection {
            connection_id,
            path,
            method: self.head.method.to_string(),
            headers: header_summary(&self.head.headers),
            protocol: self.protocol,
            timestamp: Utc::now(),
        });

        Some(socket)
    }
}

/// Flattens request headers for listeners, joining repeated values with `, `.
fn header_summary(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut summary = BTreeMap::<String, String>::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        summary
            .entry(name.as_str().to_string())
            .and_modify(|joined| {
                joined.push_str(", ");
                joined.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    summary
}

/// Checks for a 16-byte nonce in base64: 22 alphabet characters then `==`.
fn is_valid_key(key: &[u8]) -> bool {
    key.len() == 24
        && key.ends_with(b"==")
        && key
            .iter()
            .take(22)
            .all(|b| b.is_ascii_alphanumeric() || *b == b'+' || *b == b'/')
}
