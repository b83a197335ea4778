//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming path-and-query
//!     → router.rs (route table lookup)
//!     → matcher.rs (exact / prefix conditions)
//!     → Return: Route (proxy, fixed answer, or asset passthrough)
//! ```
//!
//! # Design Decisions
//! - Routes are fixed at compile time
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - First match wins; unmatched paths fall through to the asset origin

pub mod matcher;
pub mod router;

pub use router::{resolve, Route};
