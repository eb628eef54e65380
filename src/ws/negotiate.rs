//! Upgrade header inspection.

use axum::http::HeaderMap;
use axum::http::header::UPGRADE;

/// Protocol token a client must offer in `Upgrade` to be considered.
pub const WEBSOCKET_TOKEN: &str = "websocket";

/// Returns `true` if the `Upgrade` header lists `websocket` among its
/// comma-separated tokens (case-insensitive, surrounding whitespace ignored).
///
/// Missing, empty or non-UTF-8 values never match.
#[must_use]
pub fn wants_websocket(headers: &HeaderMap) -> bool {
    headers
        .get_all(UPGRADE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| has_token(value, WEBSOCKET_TOKEN))
}

/// Returns `true` if the comma-separated list `value` contains `token`.
#[must_use]
pub fn has_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_upgrade(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(UPGRADE, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn missing_header_does_not_match() {
        assert!(!wants_websocket(&HeaderMap::new()));
    }

    #[test]
    fn matches_case_insensitively() {
        assert!(wants_websocket(&with_upgrade("WebSocket")));
        assert!(wants_websocket(&with_upgrade("websocket")));
    }

    #[test]
    fn matches_within_token_list() {
        assert!(wants_websocket(&with_upgrade("h2c, websocket")));
        assert!(wants_websocket(&with_upgrade("  WEBSOCKET  ,foo")));
    }

    #[test]
    fn other_protocols_do_not_match() {
        assert!(!wants_websocket(&with_upgrade("h2c")));
        assert!(!wants_websocket(&with_upgrade("websockets")));
        assert!(!wants_websocket(&with_upgrade("")));
        assert!(!wants_websocket(&with_upgrade("web socket")));
    }

    #[test]
    fn repeated_headers_are_all_checked() {
        let mut headers = with_upgrade("h2c");
        headers.append(UPGRADE, HeaderValue::from_static("websocket"));
        assert!(wants_websocket(&headers));
    }

    #[test]
    fn non_utf8_is_ignored() {
        let mut headers = HeaderMap::new();
        let Ok(value) = HeaderValue::from_bytes(b"\xffwebsocket") else {
            return;
        };
        headers.insert(UPGRADE, value);
        assert!(!wants_websocket(&headers));
    }

    #[test]
    fn token_helper_handles_connection_lists() {
        assert!(has_token("keep-alive, Upgrade", "upgrade"));
        assert!(!has_token("keep-alive", "upgrade"));
    }
}
