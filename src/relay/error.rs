//! Relay error taxonomy.
//!
//! Every failure in the proxy flow ends up here and is converted into an
//! ordinary response at the handler boundary.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::relay::headers::ERROR_MARKER;

/// Upstream payload rejected by the integrity check.
pub struct RejectedPayload(pub Body);

impl std::fmt::Debug for RejectedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RejectedPayload(..)")
    }
}

/// Errors produced while relaying a request.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The `/http/` target is not an absolute http(s) URL.
    #[error("invalid url: {0}")]
    InvalidTargetUrl(String),

    /// The control channel is absent or empty.
    #[error("missing params")]
    MissingControlParams,

    /// The control channel carries a malformed directive or header.
    #[error("invalid params: {0}")]
    InvalidControlParams(String),

    /// The inbound request already passed through a relay.
    #[error("relay loop detected")]
    RelayLoop,

    /// The inbound body exceeded the configured limit.
    #[error("request body too large")]
    RequestBodyTooLarge,

    /// Resolution, connection, TLS or timeout failure talking to the origin.
    #[error("proxy error: {0}")]
    OutboundNetworkFailure(String),

    /// The reported content length differs from the expected one.
    #[error("bad len: {actual}, expected: {expected}")]
    ContentLengthMismatch {
        actual: String,
        expected: u64,
        payload: RejectedPayload,
    },

    /// Anything else; never escapes as a crash.
    #[error("internal error")]
    Internal(String),
}

impl RelayError {
    /// Status code sent to the client for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::InvalidTargetUrl(_)
            | RelayError::InvalidControlParams(_)
            | RelayError::ContentLengthMismatch { .. } => StatusCode::BAD_REQUEST,
            RelayError::MissingControlParams => StatusCode::FORBIDDEN,
            RelayError::RelayLoop => StatusCode::LOOP_DETECTED,
            RelayError::RequestBodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::OutboundNetworkFailure(_) | RelayError::Internal(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::InvalidTargetUrl(_) => "invalid_url",
            RelayError::MissingControlParams => "missing_params",
            RelayError::InvalidControlParams(_) => "invalid_params",
            RelayError::RelayLoop => "loop",
            RelayError::RequestBodyTooLarge => "body_too_large",
            RelayError::OutboundNetworkFailure(_) => "network",
            RelayError::ContentLengthMismatch { .. } => "length_mismatch",
            RelayError::Internal(_) => "internal",
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest's Display hides the cause ("error sending request"), so walk the chain
        let mut message = e.to_string();
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        RelayError::OutboundNetworkFailure(message)
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let diagnostic = self.to_string();

        let mut response = match self {
            RelayError::ContentLengthMismatch { payload, .. } => {
                let mut response = Response::new(payload.0);
                let headers = response.headers_mut();
                if let Ok(value) = HeaderValue::from_str(&diagnostic) {
                    headers.insert(ERROR_MARKER, value);
                }
                headers.insert(
                    header::ACCESS_CONTROL_EXPOSE_HEADERS,
                    HeaderValue::from_static(ERROR_MARKER),
                );
                response
            }
            _ => Response::new(Body::from(diagnostic)),
        };

        *response.status_mut() = status;
        response.headers_mut().insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        response
    }
}
