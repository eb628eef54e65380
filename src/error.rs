//! Error types with HTTP status code mapping.
//!
//! [`WsError`] covers configuration and extraction failures; [`HandshakeError`]
//! covers upgrade requests the acceptor refuses. Both render the same
//! structured JSON body when turned into a response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "invalid Sec-WebSocket-Key header"
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
}

/// Reasons a requested handshake could not be completed.
///
/// # Error Code Ranges
///
/// | Range     | Category            | HTTP Status                 |
/// |-----------|---------------------|-----------------------------|
/// | 1000–1999 | Invalid handshake   | 400 / 405 / 426             |
/// | 3000–3999 | Transport           | 500 Internal Server Error   |
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// Upgrade requests must use `GET`.
    #[error("websocket upgrade requires GET, got {0}")]
    MethodNotAllowed(axum::http::Method),

    /// `Sec-WebSocket-Key` is missing or not a 16-byte base64 nonce.
    #[error("missing or invalid Sec-WebSocket-Key header")]
    InvalidKey,

    /// `Sec-WebSocket-Version` is missing or not one of 8 and 13.
    #[error("missing or invalid Sec-WebSocket-Version header")]
    UnsupportedVersion,

    /// The connection carries no upgrade token (HTTP/2 or a synthetic request).
    #[error("connection cannot be upgraded")]
    UpgradeUnavailable,

    /// The transport failed while handing over the connection.
    #[error("upgrade failed: {0}")]
    Upgrade(#[from] hyper::Error),
}

impl HandshakeError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::MethodNotAllowed(_) => 1001,
            Self::InvalidKey => 1002,
            Self::UnsupportedVersion => 1003,
            Self::UpgradeUnavailable => 1004,
            Self::Upgrade(_) => 3001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::InvalidKey | Self::UnsupportedVersion => StatusCode::BAD_REQUEST,
            Self::UpgradeUnavailable => StatusCode::UPGRADE_REQUIRED,
            Self::Upgrade(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HandshakeError {
    fn into_response(self) -> Response {
        json_error(self.status_code(), self.error_code(), self.to_string())
    }
}

/// Crate-level error enum.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    /// The transport delivers upgrades as separate events, the workaround is
    /// enabled, and no transport server was supplied to patch.
    #[error(
        "the transport delivers upgrade requests as separate events; pass the \
         transport server in the options or set no_server_workaround"
    )]
    MissingServer,

    /// A handler asked for [`crate::ws::WsContext`] on a route without the
    /// websocket layer.
    #[error("websocket layer is not installed on this route")]
    MissingLayer,

    /// A handshake was refused.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
}

impl WsError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::MissingServer => 3000,
            Self::MissingLayer => 3002,
            Self::Handshake(inner) => inner.error_code(),
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingServer | Self::MissingLayer => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Handshake(inner) => inner.status_code(),
        }
    }
}

impl IntoResponse for WsError {
    fn into_response(self) -> Response {
        json_error(self.status_code(), self.error_code(), self.to_string())
    }
}

fn json_error(status: StatusCode, code: u32, message: String) -> Response {
    let body = ErrorResponse {
        error: ErrorBody { code, message },
    };
    let mut response = axum::Json(body).into_response();
    *response.status_mut() = status;
    response
}
