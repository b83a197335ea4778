//! Client for the CORS relay.
//!
//! Encodes header overrides and directives into the control channel (the
//! `referer` of the relay request) and undoes the relay's header renaming on
//! the way back.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, REFERER};
use reqwest::{Client, Method, StatusCode};
use url::form_urlencoded;

/// Headers the relay moves under the `--` prefix.
const RENAMED: [&str; 4] = [
    "access-control-allow-origin",
    "access-control-expose-headers",
    "location",
    "set-cookie",
];

/// Housekeeping headers that carry relay state rather than origin headers.
const HOUSEKEEPING: [&str; 5] = ["--s", "--ver", "--retry", "--error", "--t"];

/// One request to be sent through the relay.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    method: Method,
    target: String,
    control: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl RelayRequest {
    pub fn new(method: Method, target: &str) -> Self {
        Self {
            method,
            target: target.to_string(),
            control: Vec::new(),
            body: None,
        }
    }

    pub fn get(target: &str) -> Self {
        Self::new(Method::GET, target)
    }

    /// Send `name: value` to the origin, replacing what the relay would forward.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.control.push((name.to_string(), value.to_string()));
        self
    }

    /// Keep `name` off the outbound request.
    pub fn remove_header(mut self, name: &str) -> Self {
        self.control.push((name.to_string(), String::new()));
        self
    }

    /// Ask the relay to expose every non-safelisted header.
    pub fn legacy_exposure(mut self) -> Self {
        self.control.push(("--aceh".to_string(), "1".to_string()));
        self
    }

    /// Declare the expected content length and entity tag of the response.
    pub fn expect(mut self, origin: &str, length: Option<u64>, etag: &str) -> Self {
        let length = length.map(|l| l.to_string()).unwrap_or_default();
        self.control
            .push(("--raw-info".to_string(), format!("{}|{}|{}", origin, length, etag)));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A relay response with the origin's view of status and headers restored.
#[derive(Debug)]
pub struct RelayResponse {
    /// Status the origin sent (before redirect remapping).
    pub status: StatusCode,
    /// Status the relay sent.
    pub relay_status: StatusCode,
    /// Origin headers, renamed ones moved back to their own names.
    pub headers: HeaderMap,
    /// Redispatches the relay reported in `--retry`. The relay sends the
    /// marker only after more than one, so 0 also covers a single retry.
    pub retries: u32,
    /// Relay diagnostic, when the relay rejected the response.
    pub error: Option<String>,
    pub body: Vec<u8>,
}

impl RelayResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub struct RelayClient {
    client: Client,
    relay_url: String,
}

impl RelayClient {
    pub fn new(relay_url: &str) -> Self {
        Self::with_client(relay_url, Client::new())
    }

    pub fn with_client(relay_url: &str, client: Client) -> Self {
        Self {
            client,
            relay_url: relay_url.trim_end_matches('/').to_string(),
        }
    }

    /// Relay endpoint for a target URL.
    pub fn proxy_url(&self, target: &str) -> String {
        format!("{}/http/{}", self.relay_url, target)
    }

    /// Control-channel value for a request.
    pub fn control_channel(&self, request: &RelayRequest) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &request.control {
            query.append_pair(key, value);
        }
        format!("{}/?{}", self.relay_url, query.finish())
    }

    /// Send a request through the relay.
    pub async fn fetch(&self, request: RelayRequest) -> Result<RelayResponse, Box<dyn std::error::Error>> {
        let referer = HeaderValue::from_str(&self.control_channel(&request))?;
        let mut builder = self
            .client
            .request(request.method.clone(), self.proxy_url(&request.target))
            .header(REFERER, referer);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let resp = builder.send().await?;
        let relay_status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?.to_vec();

        Ok(decode_response(relay_status, &headers, body))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Undo the relay's header and status rewriting.
pub fn decode_response(relay_status: StatusCode, headers: &HeaderMap, body: Vec<u8>) -> RelayResponse {
    let status = header_str(headers, "--s")
        .and_then(|s| s.parse::<u16>().ok())
        .and_then(|s| StatusCode::from_u16(s).ok())
        .unwrap_or(relay_status);
    let retries = header_str(headers, "--retry")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let error = header_str(headers, "--error").map(str::to_string);

    let mut decoded = HeaderMap::new();
    for (name, value) in headers.iter() {
        let name = name.as_str();
        if HOUSEKEEPING.contains(&name) {
            continue;
        }
        if RENAMED.contains(&name) {
            // the relay's own CORS headers
            continue;
        }
        let original = match name.strip_prefix("--") {
            Some(stripped) if RENAMED.contains(&stripped) => stripped,
            _ => name,
        };
        if let Ok(original) = HeaderName::from_bytes(original.as_bytes()) {
            decoded.append(original, value.clone());
        }
    }

    RelayResponse {
        status,
        relay_status,
        headers: decoded,
        retries,
        error,
        body,
    }
}
