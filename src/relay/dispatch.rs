//! Outbound request dispatch.
//!
//! # Responsibilities
//! - Validate and normalize the `/http/` target
//! - Issue the upstream request with redirect-following disabled
//! - Map network failures to `OutboundNetworkFailure`
//!
//! # Design Decisions
//! - Redirects surface as ordinary responses; following them here would skip
//!   integrity verification and header translation for the extra hop
//! - The request body is held as `Bytes` so a retry can resend it cheaply

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method};
use url::Url;

use crate::config::TimeoutConfig;
use crate::relay::error::RelayError;
use crate::relay::params::ControlFlags;

/// A fully reconstructed request, ready to be sent (and resent) upstream.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub target: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub flags: ControlFlags,
}

/// Parse the raw path-and-query after `/http/` into an absolute URL.
///
/// Some front ends collapse `//` into `/`, so `https:/host/x` is accepted and
/// repaired before parsing.
pub fn parse_target(raw: &str) -> Result<Url, RelayError> {
    let normalized = normalize_scheme_slashes(raw);
    match Url::parse(&normalized) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => Ok(url),
        _ => Err(RelayError::InvalidTargetUrl(raw.to_string())),
    }
}

fn normalize_scheme_slashes(raw: &str) -> String {
    for scheme in ["https:", "http:"] {
        if let Some(rest) = raw.strip_prefix(scheme) {
            if rest.starts_with('/') {
                return format!("{}//{}", scheme, rest.trim_start_matches('/'));
            }
        }
    }
    raw.to_string()
}

/// Sends requests upstream without following redirects.
#[derive(Debug, Clone)]
pub struct OutboundDispatcher {
    client: reqwest::Client,
    head_timeout: Duration,
}

impl OutboundDispatcher {
    /// Build a dispatcher with its own connection pool.
    pub fn new(timeouts: &TimeoutConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()?;
        Ok(Self::with_client(client, timeouts))
    }

    /// Wrap an existing client. It must be built with `Policy::none()`.
    pub fn with_client(client: reqwest::Client, timeouts: &TimeoutConfig) -> Self {
        Self {
            client,
            head_timeout: Duration::from_secs(timeouts.upstream_secs),
        }
    }

    /// Send `request` to `url`. The URL differs from `request.target` on a retry.
    pub async fn dispatch(
        &self,
        request: &ProxyRequest,
        url: &Url,
    ) -> Result<reqwest::Response, RelayError> {
        tracing::debug!(method = %request.method, url = %url, "Dispatching upstream");

        let mut builder = self
            .client
            .request(request.method.clone(), url.clone())
            .headers(request.headers.clone());
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = match tokio::time::timeout(self.head_timeout, builder.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(url = %url, error = %e, "Upstream request failed");
                return Err(RelayError::from(e));
            }
            Err(_) => {
                tracing::warn!(url = %url, timeout = ?self.head_timeout, "Upstream request timed out");
                return Err(RelayError::OutboundNetworkFailure(format!(
                    "no response from {} within {:?}",
                    url.host_str().unwrap_or_default(),
                    self.head_timeout
                )));
            }
        };

        tracing::debug!(url = %url, status = %response.status(), "Upstream responded");
        Ok(response)
    }
}
