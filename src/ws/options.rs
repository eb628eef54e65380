//! Configuration passed once to [`super::websocket`].

use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use crate::transport::{TransportServer, UpgradeDelivery};

/// Default cap on a single message (100 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100 << 20;

/// Default cap on a single frame (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 << 20;

/// Default capacity of the acceptor's event bus.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Settings forwarded to the acceptor and the sockets it produces.
#[derive(Debug, Clone)]
pub struct AcceptorOptions {
    /// Largest message accepted from a client. `None` disables the limit.
    pub max_message_size: Option<usize>,
    /// Largest frame accepted from a client. `None` disables the limit.
    pub max_frame_size: Option<usize>,
    /// Accept frames a client sent without masking.
    pub accept_unmasked_frames: bool,
    /// Subprotocols the server speaks, in preference order.
    pub protocols: Vec<String>,
    /// Capacity of the acceptor's [`crate::domain::EventBus`].
    pub event_capacity: usize,
}

impl AcceptorOptions {
    /// Builds the tungstenite configuration applied to every upgraded socket.
    #[must_use]
    pub fn socket_config(&self) -> WebSocketConfig {
        WebSocketConfig::default()
            .max_message_size(self.max_message_size)
            .max_frame_size(self.max_frame_size)
            .accept_unmasked_frames(self.accept_unmasked_frames)
    }
}

impl Default for AcceptorOptions {
    fn default() -> Self {
        Self {
            max_message_size: Some(DEFAULT_MAX_MESSAGE_SIZE),
            max_frame_size: Some(DEFAULT_MAX_FRAME_SIZE),
            accept_unmasked_frames: false,
            protocols: Vec::new(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Options for building a [`super::WebSocketLayer`].
///
/// A bare [`TransportServer`] converts into options carrying that server and
/// its delivery mode.
#[derive(Debug, Clone, Default)]
pub struct WebSocketOptions {
    /// Transport server to patch when upgrades arrive as separate events.
    pub server: Option<TransportServer>,
    /// Acceptor passthrough settings.
    pub acceptor: AcceptorOptions,
    /// How the hosting transport delivers upgrade requests.
    pub delivery: UpgradeDelivery,
    /// Skip the event-delivery workaround even when it would apply.
    pub no_server_workaround: bool,
}

impl WebSocketOptions {
    /// Returns `true` when the transport must be patched before upgrades can
    /// reach the request pipeline.
    #[must_use]
    pub fn needs_workaround(&self) -> bool {
        self.delivery == UpgradeDelivery::Event && !self.no_server_workaround
    }
}

impl From<TransportServer> for WebSocketOptions {
    fn from(server: TransportServer) -> Self {
        Self {
            delivery: server.delivery(),
            server: Some(server),
            ..Self::default()
        }
    }
}

impl From<&TransportServer> for WebSocketOptions {
    fn from(server: &TransportServer) -> Self {
        Self::from(server.clone())
    }
}

impl From<AcceptorOptions> for WebSocketOptions {
    fn from(acceptor: AcceptorOptions) -> Self {
        Self {
            acceptor,
            ..Self::default()
        }
    }
}
