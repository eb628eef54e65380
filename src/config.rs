//! Server configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::net::SocketAddr;

use crate::transport::UpgradeDelivery;
use crate::ws::AcceptorOptions;
use crate::ws::options::{DEFAULT_EVENT_CAPACITY, DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_MESSAGE_SIZE};

/// Top-level configuration.
///
/// Loaded once at startup via [`WsConfig::from_env`].
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Largest message accepted from a client (0 = unlimited).
    pub max_message_size: usize,

    /// Largest frame accepted from a client (0 = unlimited).
    pub max_frame_size: usize,

    /// Accept unmasked client frames.
    pub accept_unmasked_frames: bool,

    /// Subprotocols the server speaks, in preference order.
    pub protocols: Vec<String>,

    /// Capacity of the acceptor's event bus.
    pub event_capacity: usize,

    /// The transport raises upgrade requests as separate events.
    pub legacy_upgrade_events: bool,

    /// Do not patch the transport even when upgrades arrive as events.
    pub no_server_workaround: bool,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            accept_unmasked_frames: false,
            protocols: Vec::new(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            legacy_upgrade_events: false,
            no_server_workaround: false,
        }
    }
}

impl WsConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to [`WsConfig::default`] values when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, std::net::AddrParseError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let listen_addr = match std::env::var("LISTEN_ADDR") {
            Ok(addr) => addr.parse()?,
            Err(_) => defaults.listen_addr,
        };

        Ok(Self {
            listen_addr,
            max_message_size: parse_env("WS_MAX_MESSAGE_SIZE", defaults.max_message_size),
            max_frame_size: parse_env("WS_MAX_FRAME_SIZE", defaults.max_frame_size),
            accept_unmasked_frames: parse_env_bool(
                "WS_ACCEPT_UNMASKED_FRAMES",
                defaults.accept_unmasked_frames,
            ),
            protocols: std::env::var("WS_PROTOCOLS")
                .map(|v| parse_list(&v))
                .unwrap_or(defaults.protocols),
            event_capacity: parse_env("WS_EVENT_CAPACITY", defaults.event_capacity),
            legacy_upgrade_events: parse_env_bool(
                "WS_LEGACY_UPGRADE_EVENTS",
                defaults.legacy_upgrade_events,
            ),
            no_server_workaround: parse_env_bool(
                "WS_NO_SERVER_WORKAROUND",
                defaults.no_server_workaround,
            ),
        })
    }

    /// Acceptor settings derived from this configuration.
    #[must_use]
    pub fn acceptor_options(&self) -> AcceptorOptions {
        AcceptorOptions {
            max_message_size: limit(self.max_message_size),
            max_frame_size: limit(self.max_frame_size),
            accept_unmasked_frames: self.accept_unmasked_frames,
            protocols: self.protocols.clone(),
            event_capacity: self.event_capacity,
        }
    }

    /// Upgrade delivery mode of the hosting transport.
    #[must_use]
    pub const fn delivery(&self) -> UpgradeDelivery {
        if self.legacy_upgrade_events {
            UpgradeDelivery::Event
        } else {
            UpgradeDelivery::Native
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

const fn limit(size: usize) -> Option<usize> {
    if size == 0 { None } else { Some(size) }
}
