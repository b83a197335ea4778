//! Control-channel decoding.
//!
//! The cooperating client cannot set arbitrary headers on a cross-origin
//! request, so it packs the original request headers and relay directives
//! into the query string of the `referer` it sends along:
//!
//! ```text
//! referer: https://relay.example/page?--aceh=1&--raw-info=s1|1000|"etag"&accept=*/*&cookie=
//! ```
//!
//! Keys starting with `--` are directives, everything else is a header
//! override. An empty override value deletes that header.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::relay::error::RelayError;
use crate::relay::headers::RESERVED_PREFIX;

/// A relay directive carried in the control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `--aceh`: the client cannot read headers through a `*` exposure list.
    LegacyExposure,
    /// `--raw-info`: `origin|length|etag` of the resource being fetched.
    RawInfo {
        origin: String,
        expected_length: Option<u64>,
        expected_tag: Option<String>,
    },
    /// Unrecognised `--` key, kept for logging.
    Unknown(String),
}

/// One decoded control-channel pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEntry {
    Directive(Directive),
    /// `None` deletes the header from the outbound request.
    HeaderOverride {
        name: HeaderName,
        value: Option<HeaderValue>,
    },
}

/// Flags collected from directives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlFlags {
    pub legacy_exposure: bool,
    pub origin_id: Option<String>,
    pub expected_length: Option<u64>,
    pub expected_tag: Option<String>,
}

/// Result of decoding: outbound headers plus flags.
#[derive(Debug, Clone)]
pub struct DecodedControl {
    pub headers: HeaderMap,
    pub flags: ControlFlags,
}

/// Extract the query carried by the `referer` header.
pub fn control_query(inbound: &HeaderMap) -> Result<&str, RelayError> {
    let referer = inbound
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .ok_or(RelayError::MissingControlParams)?;

    let query = match referer.find('?') {
        Some(pos) => &referer[pos + 1..],
        None => referer,
    };

    if query.is_empty() {
        return Err(RelayError::MissingControlParams);
    }
    Ok(query)
}

/// Parse a control query into typed entries, in order.
pub fn parse_entries(query: &str) -> Result<Vec<ControlEntry>, RelayError> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(key, value)| parse_entry(&key, &value))
        .collect()
}

fn parse_entry(key: &str, value: &str) -> Result<ControlEntry, RelayError> {
    if let Some(directive) = key.strip_prefix(RESERVED_PREFIX) {
        return parse_directive(directive, value).map(ControlEntry::Directive);
    }

    let name = HeaderName::from_bytes(key.as_bytes())
        .map_err(|_| RelayError::InvalidControlParams(format!("bad header name '{}'", key)))?;

    let value = if value.is_empty() {
        None
    } else {
        Some(HeaderValue::from_str(value).map_err(|_| {
            RelayError::InvalidControlParams(format!("bad value for header '{}'", key))
        })?)
    };

    Ok(ControlEntry::HeaderOverride { name, value })
}

fn parse_directive(name: &str, value: &str) -> Result<Directive, RelayError> {
    match name {
        "aceh" => Ok(Directive::LegacyExposure),
        "raw-info" => parse_raw_info(value),
        other => Ok(Directive::Unknown(other.to_string())),
    }
}

fn parse_raw_info(value: &str) -> Result<Directive, RelayError> {
    let parts: Vec<&str> = value.split('|').collect();
    let [origin, length, tag] = parts.as_slice() else {
        return Err(RelayError::InvalidControlParams(format!(
            "raw-info needs 3 fields, got {}",
            parts.len()
        )));
    };

    let expected_length = if length.is_empty() {
        None
    } else {
        Some(length.parse::<u64>().map_err(|_| {
            RelayError::InvalidControlParams(format!("raw-info length '{}' is not a number", length))
        })?)
    };

    Ok(Directive::RawInfo {
        origin: origin.to_string(),
        expected_length,
        expected_tag: (!tag.is_empty()).then(|| tag.to_string()),
    })
}

/// Rebuild outbound headers from the inbound ones and the control channel.
///
/// `inbound` should already be sanitized for forwarding. Overrides apply in
/// order, so a repeated key ends with its last value.
pub fn decode(inbound: &HeaderMap) -> Result<DecodedControl, RelayError> {
    let entries = parse_entries(control_query(inbound)?)?;

    let mut headers = inbound.clone();
    let mut flags = ControlFlags::default();
    let mut referer_overridden = false;

    for entry in entries {
        match entry {
            ControlEntry::Directive(Directive::LegacyExposure) => flags.legacy_exposure = true,
            ControlEntry::Directive(Directive::RawInfo { origin, expected_length, expected_tag }) => {
                flags.origin_id = Some(origin);
                flags.expected_length = expected_length;
                flags.expected_tag = expected_tag;
            }
            ControlEntry::Directive(Directive::Unknown(name)) => {
                tracing::debug!(directive = %name, "Ignoring unknown directive");
            }
            ControlEntry::HeaderOverride { name, value } => {
                if name == header::REFERER {
                    referer_overridden = true;
                }
                match value {
                    Some(value) => {
                        headers.insert(name, value);
                    }
                    None => {
                        headers.remove(name);
                    }
                }
            }
        }
    }

    // the inbound referer is the control channel itself
    if !referer_overridden {
        headers.remove(header::REFERER);
    }

    Ok(DecodedControl { headers, flags })
}
