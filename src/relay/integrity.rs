//! Content-length verification and the streaming-media retry.
//!
//! When the client knows how long a resource should be (`--raw-info`), a
//! response reporting any other length is rejected. Some media origins answer
//! a range request whose final length they cannot predict with a short body
//! holding the URL to fetch instead; for those the relay follows that URL
//! itself, a bounded number of times.

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap};
use futures_util::{stream, StreamExt};
use url::Url;

use crate::config::RelaySettings;

/// Host/path shape of origins that send redirect payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPattern {
    host_suffix: String,
    path_prefix: String,
}

impl MediaPattern {
    pub fn new(host_suffix: impl Into<String>, path_prefix: impl Into<String>) -> Self {
        Self {
            host_suffix: host_suffix.into().to_ascii_lowercase(),
            path_prefix: path_prefix.into(),
        }
    }

    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self::new(&settings.media_host_suffix, &settings.media_path_prefix)
    }

    pub fn matches(&self, url: &Url) -> bool {
        url.host_str()
            .map(|host| host.to_ascii_lowercase().ends_with(&self.host_suffix))
            .unwrap_or(false)
            && url.path().starts_with(&self.path_prefix)
    }
}

/// Attempt counter threaded through the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
    max: u32,
}

impl RetryState {
    pub fn new(max: u32) -> Self {
        Self { attempts: 0, max }
    }

    /// Redispatches performed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < self.max
    }

    /// Count one redispatch. Returns false (and counts nothing) once exhausted.
    pub fn record_retry(&mut self) -> bool {
        if !self.can_retry() {
            return false;
        }
        self.attempts += 1;
        true
    }
}

/// Outcome of comparing expected and reported lengths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LengthCheck {
    /// No expected length was supplied.
    Unchecked,
    Match,
    /// `actual` is the raw header value, empty when absent.
    Mismatch { actual: String, expected: u64 },
}

/// Compare the expected length with the reported `content-length`.
pub fn check_length(expected: Option<u64>, headers: &HeaderMap) -> LengthCheck {
    let Some(expected) = expected else {
        return LengthCheck::Unchecked;
    };

    let actual = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .trim();

    match actual.parse::<u64>() {
        Ok(len) if len == expected => LengthCheck::Match,
        _ => LengthCheck::Mismatch { actual: actual.to_string(), expected },
    }
}

/// A response body that may have been partly consumed.
#[derive(Debug)]
pub enum Payload {
    /// Read completely.
    Buffered(Bytes),
    /// Read up to the limit; the rest is still in the response.
    Partial(Bytes, reqwest::Response),
    /// The body ended early; holds the bytes read so far.
    Truncated(Bytes),
    /// Not read at all.
    Untouched(reqwest::Response),
}

impl Payload {
    /// Complete bytes, if the whole body was read.
    pub fn as_complete(&self) -> Option<&Bytes> {
        match self {
            Payload::Buffered(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Reassemble the original body stream.
    pub fn into_body(self) -> Body {
        match self {
            Payload::Buffered(bytes) | Payload::Truncated(bytes) => Body::from(bytes),
            Payload::Partial(prefix, rest) => {
                let head = stream::once(async move { Ok::<_, reqwest::Error>(prefix) });
                Body::from_stream(head.chain(rest.bytes_stream()))
            }
            Payload::Untouched(response) => Body::from_stream(response.bytes_stream()),
        }
    }
}

/// Buffer at most `limit` bytes of the body.
pub async fn read_bounded(mut response: reqwest::Response, limit: usize) -> Payload {
    let reported = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    if reported.is_some_and(|len| len > limit as u64) {
        return Payload::Untouched(response);
    }

    let mut buf = Vec::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                buf.extend_from_slice(&chunk);
                if buf.len() > limit {
                    return Payload::Partial(Bytes::from(buf), response);
                }
            }
            Ok(None) => return Payload::Buffered(Bytes::from(buf)),
            Err(e) => {
                tracing::debug!(error = %e, read = buf.len(), "Body ended early while reading redirect payload");
                return Payload::Truncated(Bytes::from(buf));
            }
        }
    }
}

/// Parse a redirect payload, accepting only URLs of the same media shape.
pub fn parse_alternate(payload: &[u8], pattern: &MediaPattern) -> Option<Url> {
    let text = std::str::from_utf8(payload).ok()?.trim();
    let url = Url::parse(text).ok()?;
    pattern.matches(&url).then_some(url)
}

/// Look for an alternate URL in a mismatched media response.
///
/// The body is consumed only when `current` is a media URL; it is handed back
/// either way so a rejection can still relay it.
pub async fn find_alternate(
    response: reqwest::Response,
    current: &Url,
    pattern: &MediaPattern,
    limit: usize,
) -> (Option<Url>, Payload) {
    if !pattern.matches(current) {
        return (None, Payload::Untouched(response));
    }

    let payload = read_bounded(response, limit).await;
    let alternate = payload
        .as_complete()
        .and_then(|bytes| parse_alternate(bytes, pattern));
    (alternate, payload)
}
