//! Header sanitation shared by inbound and outbound paths.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Strip headers the outbound client derives itself (host, content-length)
//! - Keep the relay's request ID away from origins
//! - Mark outbound requests so relay-to-relay loops are detected

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::http::request::X_REQUEST_ID;

/// Header set on every outbound request; its presence inbound means a loop.
pub const LOOP_MARKER: &str = "x-cors-relay";

/// Connection-scoped headers that never cross a proxy.
pub const HOP_BY_HOP: [HeaderName; 9] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Returns true for connection-scoped headers.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name)
}

/// Header names a `connection` header declares connection-scoped.
pub fn connection_listed(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect()
}

/// Remove hop-by-hop headers, including any named by `connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in connection_listed(headers) {
        headers.remove(name);
    }
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}

/// Prepare inbound request headers for forwarding to an origin.
pub fn sanitize_outbound(headers: &mut HeaderMap) {
    strip_hop_by_hop(headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(X_REQUEST_ID);
    headers.insert(LOOP_MARKER, HeaderValue::from_static("1"));
}

/// Returns true if the request already went through a relay.
pub fn has_loop_marker(headers: &HeaderMap) -> bool {
    headers.contains_key(LOOP_MARKER)
}
