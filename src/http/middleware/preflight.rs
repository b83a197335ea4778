//! CORS preflight responder.
//! Answers every preflight with a static allow-all policy.

use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::Response,
};

const ALLOW_METHODS: &str = "GET,POST,PUT,PATCH,TRACE,DELETE,HEAD,OPTIONS";
const MAX_AGE_SECS: &str = "1728000";

/// True for an `OPTIONS` request announcing the headers it wants to send.
pub fn is_preflight(request: &Request<Body>) -> bool {
    request.method() == Method::OPTIONS
        && request.headers().contains_key(header::ACCESS_CONTROL_REQUEST_HEADERS)
}

/// The static preflight answer.
pub fn preflight_response() -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS));
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE_SECS));
    response
}

pub async fn preflight_middleware(request: Request<Body>, next: Next) -> Response {
    if is_preflight(&request) {
        tracing::trace!(path = %request.uri().path(), "Answering preflight");
        return preflight_response();
    }
    next.run(request).await
}
