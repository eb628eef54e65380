//! Broadcast channel for acceptor events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. The acceptor
//! publishes an [`AcceptorEvent`] for every handshake outcome, and any number
//! of listeners may subscribe.

use tokio::sync::broadcast;

use super::AcceptorEvent;

/// Broadcast bus for [`AcceptorEvent`]s.
///
/// When the ring buffer is full, the oldest events are dropped for lagging
/// receivers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AcceptorEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    /// If there are no active receivers, the event is silently dropped.
    pub fn publish(&self, event: AcceptorEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AcceptorEvent> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
