//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Proxy core settings (version marker, retry limits, media pattern).
    pub relay: RelaySettings,

    /// Companion static-asset origin.
    pub asset: AssetConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Entry hardening (HTTPS upgrade, body limits).
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl RelayConfig {
    /// Replace the port of the bind address, keeping the host part.
    pub fn with_port(mut self, port: u16) -> Self {
        let host = self
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        self.listener.bind_address = format!("{}:{}", host, port);
        self
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Proxy core settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Value of the `--ver` marker header.
    pub version: u32,

    /// Maximum number of redispatches after a verified length mismatch.
    pub max_retry: u32,

    /// Largest body (in bytes) still considered a redirect payload.
    pub max_redirect_payload: usize,

    /// Host suffix of origins that answer with a redirect payload.
    pub media_host_suffix: String,

    /// Path prefix of origins that answer with a redirect payload.
    pub media_path_prefix: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            version: 10,
            max_retry: 1,
            max_redirect_payload: 2000,
            media_host_suffix: ".googlevideo.com".to_string(),
            media_path_prefix: "/videoplayback".to_string(),
        }
    }
}

/// Static-asset origin configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Base URL prepended to the request path for asset passthrough.
    pub origin: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            origin: "https://etherdream.github.io/jsproxy".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for an upstream response head, in seconds.
    pub upstream_secs: u64,

    /// Time allowed for the relay to produce a response head, in seconds.
    /// Must exceed `upstream_secs` times the number of dispatches a retried
    /// request can make.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            upstream_secs: 30,
            request_secs: 90,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Redirect plain-http entry to https.
    pub https_upgrade: bool,
    /// `strict-transport-security` value sent with the upgrade redirect.
    pub hsts: String,
    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            https_upgrade: true,
            hsts: "max-age=99999999; includeSubDomains; preload".to_string(),
            max_body_size: 16 * 1024 * 1024, // 16MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
