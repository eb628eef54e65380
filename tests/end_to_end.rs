//! End-to-end upgrade tests over real TCP connections.

#![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::collections::HashSet;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use deferred_ws::domain::AcceptorEvent;
use deferred_ws::transport::{TransportServer, UpgradeDelivery};
use deferred_ws::ws::{AcceptorOptions, WebSocketOptions, websocket};
use futures_util::future::join_all;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsClientError, Message};

use common::probe;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn upgrade_request_receives_socket() {
    let server = TransportServer::new(UpgradeDelivery::Native);
    let layer = websocket(&server).unwrap();
    let mut events = layer.server().subscribe();
    let app = Router::new().route("/ws", get(probe)).layer(layer);
    let running = common::spawn(server, app).await;

    let (mut socket, response) = connect_async(running.ws_url("/ws")).await.unwrap();
    assert_eq!(response.status(), 101);

    socket.send(Message::text("hello")).await.unwrap();
    let reply = tokio::time::timeout(WAIT, socket.next()).await.unwrap();
    let Some(Ok(Message::Text(text))) = reply else {
        panic!("expected an echoed text frame, got {reply:?}");
    };
    assert_eq!(text.as_str(), "hello");

    let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap();
    let AcceptorEvent::Connection {
        path,
        method,
        headers,
        ..
    } = event
    else {
        panic!("expected a connection event");
    };
    assert_eq!(path, "/ws");
    assert_eq!(method, "GET");
    assert_eq!(headers.get("upgrade").map(String::as_str), Some("websocket"));
    assert!(headers.contains_key("sec-websocket-key"));

    socket.close(None).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_upgrades_share_one_acceptor() {
    const CLIENTS: usize = 16;

    let server = TransportServer::new(UpgradeDelivery::Native);
    let layer = websocket(&server).unwrap();
    let mut events = layer.server().subscribe();
    let app = Router::new().route("/ws", get(probe)).layer(layer);
    let running = common::spawn(server, app).await;
    let url = running.ws_url("/ws");

    let clients = (0..CLIENTS).map(|n| {
        let url = url.clone();
        tokio::spawn(async move {
            let (mut socket, response) = connect_async(url).await.unwrap();
            assert_eq!(response.status(), 101);

            let payload = format!("client-{n}");
            socket.send(Message::text(payload.clone())).await.unwrap();
            let reply = tokio::time::timeout(WAIT, socket.next()).await.unwrap();
            let Some(Ok(Message::Text(text))) = reply else {
                panic!("client {n} expected an echoed text frame, got {reply:?}");
            };
            assert_eq!(text.as_str(), payload);
            socket.close(None).await.unwrap();
        })
    });
    for result in join_all(clients).await {
        result.unwrap();
    }

    let mut ids = HashSet::new();
    for _ in 0..CLIENTS {
        let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap();
        let AcceptorEvent::Connection { connection_id, .. } = event else {
            panic!("expected only connection events");
        };
        ids.insert(connection_id);
    }
    assert_eq!(ids.len(), CLIENTS);
}

#[tokio::test]
async fn plain_get_receives_ordinary_response() {
    let server = TransportServer::new(UpgradeDelivery::Native);
    let app = Router::new()
        .route("/ws", get(probe))
        .layer(websocket(&server).unwrap());
    let running = common::spawn(server, app).await;

    let response = reqwest::get(running.http_url("/ws")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "plain response");
}

#[tokio::test]
async fn negotiated_subprotocol_is_returned() {
    let server = TransportServer::new(UpgradeDelivery::Native);
    let layer = websocket(WebSocketOptions {
        acceptor: AcceptorOptions {
            protocols: vec!["echo.v2".to_string()],
            ..AcceptorOptions::default()
        },
        ..WebSocketOptions::from(&server)
    })
    .unwrap();
    let app = Router::new().route("/ws", get(probe)).layer(layer);
    let running = common::spawn(server, app).await;

    let mut request = running.ws_url("/ws").into_client_request().unwrap();
    request.headers_mut().insert(
        "sec-websocket-protocol",
        HeaderValue::from_static("echo.v1, echo.v2"),
    );
    let (_socket, response) = connect_async(request).await.unwrap();
    assert_eq!(
        response.headers().get("sec-websocket-protocol"),
        Some(&HeaderValue::from_static("echo.v2"))
    );
}

#[tokio::test]
async fn event_delivery_with_workaround_upgrades() {
    let server = TransportServer::new(UpgradeDelivery::Event);
    let app = Router::new()
        .route("/ws", get(probe))
        .layer(websocket(&server).unwrap());
    assert_eq!(server.upgrade_listener_count(), 1);
    let running = common::spawn(server, app).await;

    let (mut socket, _) = connect_async(running.ws_url("/ws")).await.unwrap();
    socket.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();
    let reply = tokio::time::timeout(WAIT, socket.next()).await.unwrap();
    let Some(Ok(Message::Binary(data))) = reply else {
        panic!("expected an echoed binary frame, got {reply:?}");
    };
    assert_eq!(&data[..], &[1u8, 2, 3]);
}

#[tokio::test]
async fn event_delivery_without_workaround_is_refused() {
    let server = TransportServer::new(UpgradeDelivery::Event);
    let layer = websocket(WebSocketOptions {
        no_server_workaround: true,
        ..WebSocketOptions::from(&server)
    })
    .unwrap();
    let app = Router::new().route("/ws", get(probe)).layer(layer);
    let running = common::spawn(server, app).await;

    let result = connect_async(running.ws_url("/ws")).await;
    let Err(WsClientError::Http(response)) = result else {
        panic!("expected the upgrade to be refused");
    };
    assert_eq!(response.status(), 400);

    // Ordinary requests still reach the pipeline.
    let response = reqwest::get(running.http_url("/ws")).await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn demo_router_serves_echo_and_health() {
    let server = TransportServer::new(UpgradeDelivery::Native);
    let app = deferred_ws::api::build_router(websocket(&server).unwrap());
    let running = common::spawn(server, app).await;

    let response = reqwest::get(running.http_url("/ws")).await.unwrap();
    assert_eq!(response.status(), 400);

    let health: serde_json::Value = reqwest::get(running.http_url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");

    let (mut socket, _) = connect_async(running.ws_url("/ws")).await.unwrap();
    socket.send(Message::text("ping")).await.unwrap();
    let reply = tokio::time::timeout(WAIT, socket.next()).await.unwrap();
    assert!(matches!(reply, Some(Ok(Message::Text(ref t))) if t.as_str() == "ping"));
}
