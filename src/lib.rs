//! CORS relay library.
//!
//! A public relay that fetches cross-origin resources on behalf of browser
//! code and restores an allow-all CORS policy on the way back.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod relay;
pub mod routing;
pub mod security;

pub use config::RelayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use relay::RelayCore;
