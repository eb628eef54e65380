//! The pipeline stage: a tower [`Layer`] attaching [`WsContext`] to requests.

use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures_util::future::BoxFuture;
use hyper::upgrade::OnUpgrade;
use tower::{Layer, Service};

use super::acceptor::{HandshakeHead, WsServer};
use super::capability::{WsContext, WsHandle};
use super::negotiate::wants_websocket;
use super::options::WebSocketOptions;
use crate::error::WsError;
use crate::transport::shim;

/// Creates the websocket stage.
///
/// Accepts [`WebSocketOptions`], a bare [`crate::transport::TransportServer`]
/// or [`super::AcceptorOptions`]. The stage owns one acceptor shared by every
/// request it handles. Applying several stages to one pipeline is allowed;
/// the innermost one decides what handlers see.
///
/// # Errors
///
/// Returns [`WsError::MissingServer`] when the transport delivers upgrades as
/// separate events, the workaround is not disabled, and no server was given.
pub fn websocket(options: impl Into<WebSocketOptions>) -> Result<WebSocketLayer, WsError> {
    let options = options.into();

    if options.needs_workaround() {
        let server = options.server.as_ref().ok_or(WsError::MissingServer)?;
        shim::install(server);
    }

    tracing::debug!("websocket middleware created");
    Ok(WebSocketLayer {
        server: WsServer::new(&options.acceptor),
    })
}

/// Tower layer produced by [`websocket`].
#[derive(Debug, Clone)]
pub struct WebSocketLayer {
    server: WsServer,
}

impl WebSocketLayer {
    /// The acceptor shared by every request of this stage.
    #[must_use]
    pub fn server(&self) -> &WsServer {
        &self.server
    }
}

impl<S> Layer<S> for WebSocketLayer {
    type Service = WebSocketService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        WebSocketService {
            inner,
            server: self.server.clone(),
        }
    }
}

/// Service produced by [`WebSocketLayer`].
#[derive(Debug, Clone)]
pub struct WebSocketService<S> {
    inner: S,
    server: WsServer,
}

impl<S> Service<Request<Body>> for WebSocketService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let server = self.server.clone();

        Box::pin(async move {
            tracing::debug!(path = request.uri().path(), "websocket middleware called");

            if !wants_websocket(request.headers()) {
                request.extensions_mut().insert(WsContext::passthrough());
                return inner.call(request).await;
            }

            tracing::debug!(path = request.uri().path(), "websocket middleware in use");
            let head = HandshakeHead::from_request(&request);
            let on_upgrade = request.extensions().get::<OnUpgrade>().cloned();
            let (handle, mut takeover) = WsHandle::deferred(server.clone(), head, on_upgrade);
            request
                .extensions_mut()
                .insert(WsContext::new(handle, Some(server)));

            let mut handler = Box::pin(inner.call(request));
            tokio::select! {
                biased;
                Ok(reply) = &mut takeover => {
                    // The handler keeps the socket; whatever it returns is dropped.
                    tokio::spawn(async move {
                        let _ = handler.await;
                    });
                    Ok(reply)
                }
                result = &mut handler => match takeover.try_recv() {
                    Ok(reply) => Ok(reply),
                    Err(_) => result,
                },
            }
        })
    }
}
