//! Response header translation.
//!
//! Browsers hide or act on a handful of upstream headers (`location`,
//! `set-cookie`, the CORS pair). Those are moved under the reserved `--`
//! prefix so client code can read them, and the relay's own allow-all CORS
//! policy is written in their place.
//!
//! # Data Flow
//! ```text
//! upstream HeaderMap + status
//!     → rename reserved headers (--location, --set-cookie, ...)
//!     → strip embedding blockers, hop-by-hop and connection-listed headers
//!     → build ExposureList (legacy clients name every header)
//!     → TranslatedHeaders (exposure list written last, on into_header_map)
//! ```

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::security::headers::{connection_listed, is_hop_by_hop};

/// Prefix for renamed headers and control-channel directives.
pub const RESERVED_PREFIX: &str = "--";

/// Mirrors the true upstream status.
pub const STATUS_MIRROR: &str = "--s";
/// Relay version marker.
pub const VERSION_MARKER: &str = "--ver";
/// Number of redispatches that preceded an accepted response.
pub const RETRY_MARKER: &str = "--retry";
/// Integrity diagnostic.
pub const ERROR_MARKER: &str = "--error";
/// Set for clients without wildcard exposure support.
pub const COMPAT_MARKER: &str = "--t";

/// Headers moved under the reserved prefix.
pub const RENAMED: [HeaderName; 4] = [
    header::ACCESS_CONTROL_ALLOW_ORIGIN,
    header::ACCESS_CONTROL_EXPOSE_HEADERS,
    header::LOCATION,
    header::SET_COOKIE,
];

/// Headers every browser exposes without being listed.
pub const DEFAULT_SAFE: [HeaderName; 6] = [
    header::CACHE_CONTROL,
    header::CONTENT_LANGUAGE,
    header::CONTENT_TYPE,
    header::EXPIRES,
    header::LAST_MODIFIED,
    header::PRAGMA,
];

/// Headers that would block embedding or clash with the relay's policy.
pub const STRIPPED: [HeaderName; 3] = [
    header::CONTENT_SECURITY_POLICY,
    header::CONTENT_SECURITY_POLICY_REPORT_ONLY,
    HeaderName::from_static("clear-site-data"),
];

/// Reserved-prefix name for a renamed header.
pub fn prefixed(name: &HeaderName) -> HeaderName {
    let renamed = format!("{}{}", RESERVED_PREFIX, name.as_str());
    // prefix and source are both valid tokens
    HeaderName::from_bytes(renamed.as_bytes()).unwrap_or_else(|_| name.clone())
}

/// Ordered, de-duplicated list for `access-control-expose-headers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposureList {
    names: Vec<String>,
}

impl ExposureList {
    /// A list holding only the wildcard.
    pub fn new() -> Self {
        Self { names: vec!["*".to_string()] }
    }

    /// Append a name unless already present.
    pub fn push(&mut self, name: &str) {
        if !self.names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            self.names.push(name.to_ascii_lowercase());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Comma-joined header value.
    pub fn to_header_value(&self) -> HeaderValue {
        HeaderValue::from_str(&self.names.join(","))
            .unwrap_or_else(|_| HeaderValue::from_static("*"))
    }
}

impl Default for ExposureList {
    fn default() -> Self {
        Self::new()
    }
}

/// Client-facing headers for one upstream response.
#[derive(Debug, Clone)]
pub struct TranslatedHeaders {
    headers: HeaderMap,
    exposure: ExposureList,
    legacy: bool,
}

impl TranslatedHeaders {
    /// Attach a housekeeping header, exposing it to legacy clients.
    pub fn insert_marker(&mut self, name: &'static str, value: HeaderValue) {
        self.headers.insert(name, value);
        if self.legacy {
            self.exposure.push(name);
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn exposure(&self) -> &ExposureList {
        &self.exposure
    }

    /// Final header map with the exposure list written in.
    pub fn into_header_map(mut self) -> HeaderMap {
        self.headers.insert(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            self.exposure.to_header_value(),
        );
        self.headers
    }
}

/// Rewrite upstream headers for a cross-origin client.
pub fn translate(
    upstream: &HeaderMap,
    status: StatusCode,
    legacy: bool,
    version: u32,
) -> TranslatedHeaders {
    let mut headers = HeaderMap::with_capacity(upstream.keys_len() + 5);
    let mut exposure = ExposureList::new();
    let listed = connection_listed(upstream);

    for name in upstream.keys() {
        if STRIPPED.contains(name) || is_hop_by_hop(name) || listed.contains(name) {
            continue;
        }

        if RENAMED.contains(name) {
            let renamed = prefixed(name);
            for value in upstream.get_all(name) {
                headers.append(renamed.clone(), value.clone());
            }
            if legacy {
                exposure.push(renamed.as_str());
            }
            continue;
        }

        for value in upstream.get_all(name) {
            headers.append(name.clone(), value.clone());
        }
        if legacy && !DEFAULT_SAFE.contains(name) {
            exposure.push(name.as_str());
        }
    }

    if legacy {
        exposure.push(STATUS_MIRROR);
        exposure.push(VERSION_MARKER);
        headers.insert(COMPAT_MARKER, HeaderValue::from_static("1"));
    }

    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(STATUS_MIRROR, HeaderValue::from(status.as_u16()));
    headers.insert(VERSION_MARKER, HeaderValue::from(version));

    TranslatedHeaders { headers, exposure, legacy }
}
