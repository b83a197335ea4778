//! Proxy core.
//!
//! # Data Flow
//! ```text
//! /http/<url> request
//!     → params.rs (decode control channel, rebuild headers)
//!     → dispatch.rs (send upstream, redirects surface as responses)
//!     → headers.rs (rename reserved headers, build exposure list)
//!     → integrity.rs (length check; on a media redirect payload, loop back to dispatch)
//!     → redirect.rs (3xx → 3xx + 10)
//!     → streamed response
//! ```
//!
//! # Design Decisions
//! - One sequential flow per request; nothing shared but the client pool
//! - Nothing is emitted before the length check when a length is expected
//! - The upstream body is streamed unless verification needs to read it

pub mod dispatch;
pub mod error;
pub mod headers;
pub mod integrity;
pub mod params;
pub mod redirect;

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    response::Response,
};

use crate::config::{RelayConfig, RelaySettings};
use crate::observability::metrics;
use crate::security::headers::{has_loop_marker, sanitize_outbound};

pub use dispatch::{OutboundDispatcher, ProxyRequest};
pub use error::RelayError;
pub use headers::ExposureList;
pub use integrity::{MediaPattern, RetryState};

use integrity::{check_length, find_alternate, LengthCheck, Payload};

/// The proxy transformation engine.
#[derive(Debug, Clone)]
pub struct RelayCore {
    settings: RelaySettings,
    pattern: MediaPattern,
    dispatcher: OutboundDispatcher,
    max_body_size: usize,
}

impl RelayCore {
    pub fn new(config: &RelayConfig, dispatcher: OutboundDispatcher) -> Self {
        Self {
            pattern: MediaPattern::from_settings(&config.relay),
            settings: config.relay.clone(),
            dispatcher,
            max_body_size: config.security.max_body_size,
        }
    }

    /// Relay an inbound `/http/<raw_target>` request.
    pub async fn handle(&self, request: Request<Body>, raw_target: &str) -> Result<Response, RelayError> {
        let proxy_request = self.prepare(request, raw_target).await?;
        self.relay(proxy_request).await
    }

    /// Turn the inbound request into a `ProxyRequest`.
    pub async fn prepare(&self, request: Request<Body>, raw_target: &str) -> Result<ProxyRequest, RelayError> {
        let (parts, body) = request.into_parts();

        if has_loop_marker(&parts.headers) {
            return Err(RelayError::RelayLoop);
        }

        let mut decoded = params::decode(&parts.headers)?;
        sanitize_outbound(&mut decoded.headers);
        let target = dispatch::parse_target(raw_target)?;

        let body = axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| {
                tracing::debug!(error = %e, "Failed to buffer request body");
                RelayError::RequestBodyTooLarge
            })?;

        tracing::debug!(
            target = %target,
            legacy = decoded.flags.legacy_exposure,
            origin_id = ?decoded.flags.origin_id,
            expected_length = ?decoded.flags.expected_length,
            expected_tag = ?decoded.flags.expected_tag,
            "Decoded control channel"
        );

        Ok(ProxyRequest {
            target,
            method: parts.method,
            headers: decoded.headers,
            body,
            flags: decoded.flags,
        })
    }

    /// Dispatch, translate, verify and remap.
    pub async fn relay(&self, request: ProxyRequest) -> Result<Response, RelayError> {
        let mut retry = RetryState::new(self.settings.max_retry);
        let mut url = request.target.clone();

        loop {
            let upstream = self.dispatcher.dispatch(&request, &url).await?;
            let status = upstream.status();
            let mut translated = headers::translate(
                upstream.headers(),
                status,
                request.flags.legacy_exposure,
                self.settings.version,
            );

            match check_length(request.flags.expected_length, upstream.headers()) {
                LengthCheck::Unchecked => {}
                LengthCheck::Match => {
                    if retry.attempts() > 1 {
                        translated.insert_marker(headers::RETRY_MARKER, HeaderValue::from(retry.attempts()));
                    }
                }
                LengthCheck::Mismatch { actual, expected } => {
                    tracing::info!(
                        url = %url,
                        actual = %actual,
                        expected = expected,
                        attempt = retry.attempts(),
                        "Content length mismatch"
                    );

                    let (alternate, payload) = if retry.can_retry() {
                        find_alternate(upstream, &url, &self.pattern, self.settings.max_redirect_payload).await
                    } else {
                        (None, Payload::Untouched(upstream))
                    };

                    if let Some(next) = alternate {
                        if retry.record_retry() {
                            tracing::info!(from = %url, to = %next, attempt = retry.attempts(), "Following media redirect payload");
                            metrics::record_retry();
                            url = next;
                            continue;
                        }
                    }

                    metrics::record_length_mismatch();
                    return Err(RelayError::ContentLengthMismatch {
                        actual,
                        expected,
                        payload: error::RejectedPayload(payload.into_body()),
                    });
                }
            }

            let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
            *response.status_mut() = redirect::remap_status(status);
            *response.headers_mut() = translated.into_header_map();
            return Ok(response);
        }
    }
}
