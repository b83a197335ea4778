//! Redirect status remapping.
//!
//! A cross-origin fetch in manual redirect mode only sees an opaque response
//! for 3xx statuses. Shifting them by 10 keeps the response readable, and the
//! client reissues a proxied request at the translated `--location` itself.

use axum::http::StatusCode;

/// Shift redirect statuses out of the 3xx range browsers act on.
pub fn remap_status(status: StatusCode) -> StatusCode {
    match status.as_u16() {
        code @ (301 | 302 | 303 | 307 | 308) => StatusCode::from_u16(code + 10).unwrap_or(status),
        _ => status,
    }
}
