//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, layers, entry handler)
//!     → middleware/ (https upgrade, preflight)
//!     → [routing table picks proxy, fixed answer or asset]
//!     → asset.rs / response.rs / relay core
//!     → Send to client
//! ```

pub mod asset;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use asset::AssetOrigin;
pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{HttpServer, ServerError};
