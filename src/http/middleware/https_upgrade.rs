//! Plain-http entry upgrade.
//!
//! The relay normally sits behind a TLS terminator, so the entry scheme is
//! read from `x-forwarded-proto` (or an absolute-form request URI). Requests
//! with no scheme information are served as-is.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::config::SecurityConfig;

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// True when the client reached the relay over plain http.
pub fn is_plain_http(request: &Request<Body>) -> bool {
    if let Some(proto) = request
        .headers()
        .get(X_FORWARDED_PROTO)
        .and_then(|v| v.to_str().ok())
    {
        // first hop is the client's
        let first = proto.split(',').next().unwrap_or("").trim();
        return first.eq_ignore_ascii_case("http");
    }
    request.uri().scheme_str() == Some("http")
}

/// `https://` location for the same host and path, if a host is known.
pub fn https_location(request: &Request<Body>) -> Option<String> {
    let host = request
        .uri()
        .authority()
        .map(|a| a.as_str().to_string())
        .or_else(|| {
            request
                .headers()
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })?;
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Some(format!("https://{}{}", host, path))
}

pub async fn https_upgrade_middleware(
    State(security): State<Arc<SecurityConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !security.https_upgrade || !is_plain_http(&request) {
        return next.run(request).await;
    }

    let Some(location) = https_location(&request).and_then(|l| HeaderValue::from_str(&l).ok()) else {
        return next.run(request).await;
    };

    tracing::debug!(location = ?location, "Upgrading plain-http request");

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::MOVED_PERMANENTLY;
    let headers = response.headers_mut();
    headers.insert(header::LOCATION, location);
    if let Ok(hsts) = HeaderValue::from_str(&security.hsts) {
        headers.insert(header::STRICT_TRANSPORT_SECURITY, hsts);
    }
    response
}
