//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound headers
//!     → headers.rs (loop check, hop-by-hop strip, outbound marker)
//!     → origin
//! ```

pub mod headers;
