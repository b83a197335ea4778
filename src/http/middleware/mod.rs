//! Middleware that answers before a request reaches the router.
//!
//! # Order
//! ```text
//! https_upgrade.rs (plain-http entry → 301 https)
//!     → preflight.rs (CORS preflight → 204)
//!     → router
//! ```

pub mod https_upgrade;
pub mod preflight;

pub use https_upgrade::https_upgrade_middleware;
pub use preflight::preflight_middleware;
