//! Per-request upgrade capability.
//!
//! The stage attaches a [`WsContext`] to every request's extensions. Handlers
//! call [`WsContext::ws`] unconditionally: requests that did not ask for an
//! upgrade resolve `None`, requests that did get their handshake performed on
//! demand.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use hyper::upgrade::OnUpgrade;
use tokio::sync::oneshot;

use super::acceptor::{HandshakeHead, WebSocket, WsServer};
use crate::error::WsError;

/// Context extension attached by [`super::WebSocketLayer`].
#[derive(Debug, Clone)]
pub struct WsContext {
    ws: WsHandle,
    ws_server: Option<WsServer>,
}

impl WsContext {
    pub(crate) fn new(ws: WsHandle, ws_server: Option<WsServer>) -> Self {
        Self { ws, ws_server }
    }

    /// Context for a request that did not ask for an upgrade.
    #[must_use]
    pub fn passthrough() -> Self {
        Self::new(WsHandle::noop(), None)
    }

    /// Performs the handshake if the client asked for one.
    ///
    /// See [`WsHandle::ws`].
    pub fn ws(&self) -> BoxFuture<'static, Option<WebSocket>> {
        self.ws.ws()
    }

    /// The capability itself.
    #[must_use]
    pub fn handle(&self) -> &WsHandle {
        &self.ws
    }

    /// The stage's acceptor, or `None` when no upgrade was requested.
    #[must_use]
    pub fn ws_server(&self) -> Option<&WsServer> {
        self.ws_server.as_ref()
    }

    /// Returns `false` once the handshake took over the response.
    #[must_use]
    pub fn responds(&self) -> bool {
        self.ws.responds()
    }
}

impl<S> FromRequestParts<S> for WsContext
where
    S: Send + Sync,
{
    type Rejection = WsError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(WsError::MissingLayer)
    }
}

/// Lazy, single-shot handshake trigger.
#[derive(Clone)]
pub struct WsHandle {
    deferred: Option<Arc<Deferred>>,
}

struct Deferred {
    pending: Mutex<Option<PendingHandshake>>,
    responds: AtomicBool,
}

struct PendingHandshake {
    server: WsServer,
    head: HandshakeHead,
    on_upgrade: Option<OnUpgrade>,
    takeover: oneshot::Sender<Response>,
}

impl WsHandle {
    /// A handle that always resolves `None`.
    #[must_use]
    pub fn noop() -> Self {
        Self { deferred: None }
    }

    /// A handle performing the handshake for `head` on `server`.
    ///
    /// The receiver yields the reply that must replace the pipeline's own
    /// response once [`Self::ws`] is called.
    pub(crate) fn deferred(
        server: WsServer,
        head: HandshakeHead,
        on_upgrade: Option<OnUpgrade>,
    ) -> (Self, oneshot::Receiver<Response>) {
        let (takeover, rx) = oneshot::channel();
        let deferred = Deferred {
            pending: Mutex::new(Some(PendingHandshake {
                server,
                head,
                on_upgrade,
                takeover,
            })),
            responds: AtomicBool::new(true),
        };
        (
            Self {
                deferred: Some(Arc::new(deferred)),
            },
            rx,
        )
    }

    /// Returns `true` if this handle performs a real handshake.
    #[must_use]
    pub fn is_upgrade(&self) -> bool {
        self.deferred.is_some()
    }

    /// Returns `false` once the handshake took over the response.
    #[must_use]
    pub fn responds(&self) -> bool {
        self.deferred
            .as_ref()
            .is_none_or(|d| d.responds.load(Ordering::SeqCst))
    }

    /// Performs the handshake and resolves the upgraded socket.
    ///
    /// The pipeline's response is suppressed as soon as this is called, before
    /// the returned future is polled. The returned future never fails:
    /// without an upgrade request, after a refused handshake, or on a second
    /// call it resolves `None`. Refusals are reported through the acceptor.
    pub fn ws(&self) -> BoxFuture<'static, Option<WebSocket>> {
        let Some(deferred) = &self.deferred else {
            return future::ready(None).boxed();
        };

        let pending = match deferred.pending.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(PendingHandshake {
            server,
            head,
            on_upgrade,
            takeover,
        }) = pending
        else {
            tracing::debug!("websocket handshake already performed for this request");
            return future::ready(None).boxed();
        };

        deferred.responds.store(false, Ordering::SeqCst);

        match server.prepare(&head, on_upgrade) {
            Ok((reply, upgrade)) => {
                if takeover.send(reply).is_err() {
                    tracing::debug!(path = head.path(), "response already sent, upgrade reply dropped");
                }
                upgrade.complete().boxed()
            }
            Err(e) => {
                server.report_failure(head.path(), &e);
                let _ = takeover.send(e.into_response());
                future::ready(None).boxed()
            }
        }
    }
}

impl fmt::Debug for WsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsHandle")
            .field("is_upgrade", &self.is_upgrade())
            .field("responds", &self.responds())
            .finish()
    }
}
