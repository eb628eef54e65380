//! Minimal hyper-based HTTP server hosting an axum [`Router`].
//!
//! Every connection is served with upgrades enabled, so hyper places an
//! `OnUpgrade` token in each request's extensions. In
//! [`UpgradeDelivery::Event`] mode, requests asking for an upgrade are raised
//! to upgrade listeners instead of the router.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use axum::Router;
use axum::body::Body;
use axum::http::header::{CONNECTION, UPGRADE};
use axum::http::{HeaderValue, Request, StatusCode};
use axum::response::Response;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::TcpListener;
use tower::ServiceExt;

use super::UpgradeDelivery;
use crate::ws::negotiate::has_token;

/// Listener invoked for upgrade requests in [`UpgradeDelivery::Event`] mode.
pub type UpgradeListener = Arc<dyn Fn(Request<Body>) -> BoxFuture<'static, Response> + Send + Sync>;

/// Shared handle to a transport server. Clones refer to the same server.
#[derive(Clone)]
pub struct TransportServer {
    inner: Arc<ServerInner>,
}

pub(crate) struct ServerInner {
    delivery: UpgradeDelivery,
    pipeline: RwLock<Option<Router>>,
    upgrade_listeners: RwLock<Vec<UpgradeListener>>,
}

impl TransportServer {
    /// Creates a server with the given upgrade delivery mode.
    #[must_use]
    pub fn new(delivery: UpgradeDelivery) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                delivery,
                pipeline: RwLock::new(None),
                upgrade_listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    /// How this server delivers upgrade requests.
    #[must_use]
    pub fn delivery(&self) -> UpgradeDelivery {
        self.inner.delivery
    }

    /// Registers a listener for upgrade requests.
    pub fn on_upgrade<F, Fut>(&self, listener: F)
    where
        F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let listener: UpgradeListener = Arc::new(move |request: Request<Body>| listener(request).boxed());
        self.inner
            .upgrade_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Number of registered upgrade listeners.
    #[must_use]
    pub fn upgrade_listener_count(&self) -> usize {
        self.inner
            .upgrade_listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Installs the router that ordinary requests are dispatched to.
    pub fn set_pipeline(&self, router: Router) {
        *self
            .inner
            .pipeline
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(router);
    }

    /// Runs `request` through the request pipeline.
    ///
    /// Without an installed pipeline the request is answered with an empty
    /// response.
    pub async fn emit_request(&self, request: Request<Body>) -> Response {
        let pipeline = self
            .inner
            .pipeline
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match pipeline {
            Some(router) => router
                .oneshot(request)
                .await
                .unwrap_or_else(|never: Infallible| match never {}),
            None => Response::new(Body::empty()),
        }
    }

    /// Raises `request` to the first upgrade listener.
    ///
    /// With no listener registered the connection is refused with `400` and
    /// closed.
    pub async fn emit_upgrade(&self, request: Request<Body>) -> Response {
        let listener = self
            .inner
            .upgrade_listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .first()
            .cloned();
        match listener {
            Some(listener) => listener(request).await,
            None => {
                tracing::debug!(path = request.uri().path(), "upgrade request without listener");
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::BAD_REQUEST;
                response
                    .headers_mut()
                    .insert(CONNECTION, HeaderValue::from_static("close"));
                response
            }
        }
    }

    /// Routes one request according to the delivery mode.
    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        if self.inner.delivery == UpgradeDelivery::Event && is_upgrade_request(&request) {
            return self.emit_upgrade(request).await;
        }
        self.emit_request(request).await
    }

    /// Accepts connections on `listener` until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub async fn serve<F>(
        &self,
        listener: TcpListener,
        router: Router,
        shutdown: F,
    ) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send,
    {
        self.set_pipeline(router);
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, delivery = ?self.delivery(), "transport server listening");

        tokio::pin!(shutdown);
        loop {
            let (stream, remote) = tokio::select! {
                () = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
            };

            let server = self.clone();
            tokio::spawn(async move {
                let service = service_fn(move |request: Request<Incoming>| {
                    let server = server.clone();
                    async move { Ok::<_, Infallible>(server.dispatch(request.map(Body::new)).await) }
                });
                let builder = auto::Builder::new(TokioExecutor::new());
                let connection =
                    builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
                if let Err(e) = connection.await {
                    tracing::debug!(%remote, error = %e, "connection closed with error");
                }
            });
        }

        tracing::info!("transport server stopped");
        Ok(())
    }

    pub(crate) fn downgrade(&self) -> Weak<ServerInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_weak(weak: &Weak<ServerInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub(crate) fn is(&self, weak: &Weak<ServerInner>) -> bool {
        std::ptr::eq(Arc::as_ptr(&self.inner), weak.as_ptr())
    }
}

impl fmt::Debug for TransportServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportServer")
            .field("delivery", &self.inner.delivery)
            .field("upgrade_listeners", &self.upgrade_listener_count())
            .finish()
    }
}

/// Mirrors HTTP/1.1 parser behavior: an upgrade is announced by an `Upgrade`
/// header together with the `upgrade` token in `Connection`.
fn is_upgrade_request<B>(request: &Request<B>) -> bool {
    let headers = request.headers();
    headers.contains_key(UPGRADE)
        && headers
            .get_all(CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| has_token(v, "upgrade"))
}
