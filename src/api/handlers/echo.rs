//! Echo endpoint: upgrades when asked, answers plainly otherwise.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use crate::ws::{WebSocket, WsContext};

/// `GET /ws` — Echoes every text and binary message back to the client.
///
/// Plain HTTP requests receive `400` with a short explanation.
pub async fn echo_handler(ctx: WsContext) -> Response {
    let Some(socket) = ctx.ws().await else {
        return (StatusCode::BAD_REQUEST, "This is a websocket endpoint").into_response();
    };

    run_echo(socket).await;
    // The connection was taken over; this response is discarded.
    StatusCode::OK.into_response()
}

/// Runs the read/write loop for a single echo connection.
pub async fn run_echo(socket: WebSocket) {
    let (mut tx, mut rx) = socket.split();

    while let Some(msg) = rx.next().await {
        let reply = match msg {
            Ok(Message::Text(text)) => Message::Text(text),
            Ok(Message::Binary(data)) => Message::Binary(data),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        if tx.send(reply).await.is_err() {
            break;
        }
    }

    tracing::debug!("echo connection closed");
}
