//! Domain layer: connection identity and acceptor notifications.
//!
//! These types describe what the acceptor reports about upgrades. They carry
//! no socket state; the sockets themselves are handed straight to handlers.

pub mod acceptor_event;
pub mod connection_id;
pub mod event_bus;

pub use acceptor_event::AcceptorEvent;
pub use connection_id::ConnectionId;
pub use event_bus::EventBus;
