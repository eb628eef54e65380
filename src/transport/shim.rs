//! Compatibility shim for transports that raise upgrades as separate events.
//!
//! Such a server never passes upgrade requests to the request pipeline, so
//! the websocket stage would never see them. [`install`] registers one
//! upgrade listener per server that feeds the request straight back into the
//! pipeline. Patched servers are remembered in a process-wide registry of weak
//! references, keyed by identity, so a server is patched at most once and the
//! registry never keeps one alive.

use std::sync::{Mutex, PoisonError, Weak};

use axum::body::Body;
use axum::response::Response;

use super::TransportServer;
use super::server::ServerInner;

static PATCHED: Mutex<Vec<Weak<ServerInner>>> = Mutex::new(Vec::new());

/// Patches `server` so its upgrade requests reach the request pipeline.
///
/// Returns `false` without doing anything if the server was already patched.
pub fn install(server: &TransportServer) -> bool {
    let mut patched = PATCHED.lock().unwrap_or_else(PoisonError::into_inner);
    patched.retain(|weak| weak.strong_count() > 0);
    if patched.iter().any(|weak| server.is(weak)) {
        return false;
    }
    patched.push(server.downgrade());

    let target = server.downgrade();
    server.on_upgrade(move |request| {
        let server = TransportServer::from_weak(&target);
        async move {
            match server {
                Some(server) => server.emit_request(request).await,
                None => Response::new(Body::empty()),
            }
        }
    });

    tracing::debug!("added workaround to a server");
    true
}

/// Returns `true` if `server` has been patched.
#[must_use]
pub fn is_patched(server: &TransportServer) -> bool {
    PATCHED
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .any(|weak| server.is(weak))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::UpgradeDelivery;
    use crate::ws::{WebSocketOptions, websocket};

    #[test]
    fn install_is_idempotent() {
        let server = TransportServer::new(UpgradeDelivery::Event);
        assert!(!is_patched(&server));

        assert!(install(&server));
        assert!(!install(&server));
        assert!(!install(&server.clone()));

        assert!(is_patched(&server));
        assert_eq!(server.upgrade_listener_count(), 1);
    }

    #[test]
    fn repeated_stage_construction_patches_once() {
        let server = TransportServer::new(UpgradeDelivery::Event);
        for _ in 0..3 {
            assert!(websocket(&server).is_ok());
        }
        assert_eq!(server.upgrade_listener_count(), 1);
    }

    #[test]
    fn native_servers_are_left_alone() {
        let server = TransportServer::new(UpgradeDelivery::Native);
        assert!(websocket(WebSocketOptions::from(&server)).is_ok());
        assert!(!is_patched(&server));
        assert_eq!(server.upgrade_listener_count(), 0);
    }

    #[test]
    fn distinct_servers_are_patched_separately() {
        let a = TransportServer::new(UpgradeDelivery::Event);
        let b = TransportServer::new(UpgradeDelivery::Event);
        assert!(install(&a));
        assert!(install(&b));
        assert_eq!(a.upgrade_listener_count(), 1);
        assert_eq!(b.upgrade_listener_count(), 1);
    }

    #[test]
    fn registry_does_not_keep_servers_alive() {
        let server = TransportServer::new(UpgradeDelivery::Event);
        let weak = server.downgrade();
        assert!(install(&server));

        drop(server);
        assert!(weak.upgrade().is_none());
    }
}
