//! Companion static-asset passthrough.
//!
//! Paths the router does not claim are fetched from the asset origin, so a
//! single host serves both the relay and the client pages that drive it.

use std::time::Duration;

use axum::response::Response;

use crate::config::{schema::AssetConfig, TimeoutConfig};
use crate::http::response::passthrough;
use crate::relay::RelayError;

/// Fetches `<origin><path>` for unrouted requests.
#[derive(Debug, Clone)]
pub struct AssetOrigin {
    base: String,
    client: reqwest::Client,
}

impl AssetOrigin {
    pub fn new(config: &AssetConfig, timeouts: &TimeoutConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: &AssetConfig, client: reqwest::Client) -> Self {
        Self {
            base: config.origin.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Absolute asset URL for a path-and-query starting with `/`.
    pub fn url_for(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base, path_and_query)
    }

    pub async fn fetch(&self, path_and_query: &str) -> Result<Response, RelayError> {
        let url = self.url_for(path_and_query);
        tracing::debug!(url = %url, "Fetching static asset");
        let upstream = self.client.get(&url).send().await?;
        Ok(passthrough(upstream))
    }
}
