//! Fixed responses outside the proxy core.
//!
//! # Responsibilities
//! - Health probe, unsupported-socket and outdated-client answers
//! - Relaying asset-origin responses without hop-by-hop headers
//!
//! Every response additionally gets `access-control-allow-origin: *` and the
//! `--ver` marker from the response-header layers in `server.rs`.

use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::security::headers::strip_hop_by_hop;

/// Answer for `/works`.
pub fn health_probe() -> Response {
    (StatusCode::OK, "it works").into_response()
}

/// Answer for `/ws`; the relay does not carry sockets.
pub fn websocket_unsupported() -> Response {
    (StatusCode::BAD_REQUEST, "not support").into_response()
}

/// Answer for a bare `/http`, which only clients predating `/http/<url>` send.
pub fn outdated_client() -> Response {
    (StatusCode::OK, "client outdated: please update to the latest version").into_response()
}

/// Stream an upstream response back unchanged apart from hop-by-hop headers.
pub fn passthrough(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
