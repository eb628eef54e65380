//! Shared helpers for integration tests.

#![allow(dead_code, clippy::panic)]

use std::net::SocketAddr;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use deferred_ws::api::handlers::echo::run_echo;
use deferred_ws::transport::TransportServer;
use deferred_ws::ws::WsContext;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// A running server; dropping it stops accepting connections.
pub struct TestServer {
    pub addr: SocketAddr,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Binds an ephemeral port and serves `router` on `server`.
pub async fn spawn(server: TransportServer, router: Router) -> TestServer {
    let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("failed to bind test listener");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("listener has no address");
    };
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let shutdown = async {
            let _ = rx.await;
        };
        let _ = server.serve(listener, router, shutdown).await;
    });
    TestServer {
        addr,
        _shutdown: tx,
    }
}

/// Echoes over the socket when upgraded; otherwise reports a plain response.
///
/// The upgraded branch returns `418`, which must never reach the client.
pub async fn probe(ctx: WsContext) -> Response {
    match ctx.ws().await {
        Some(socket) => {
            run_echo(socket).await;
            (StatusCode::IM_A_TEAPOT, "never transmitted").into_response()
        }
        None => (StatusCode::OK, "plain response").into_response(),
    }
}
