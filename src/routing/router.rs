//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store the fixed route table
//! - Resolve a path-and-query to a route
//!
//! # Design Decisions
//! - Immutable table (thread-safe without locks)
//! - First match wins; anything unmatched is a static asset

use crate::routing::matcher::PathMatcher;

/// Where a request goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// `/http/<target>`: the proxy core.
    Proxy { target: &'a str },
    /// Bare `/http` from an old client.
    OutdatedClient,
    /// `/ws`: sockets are not relayed.
    WebSocket,
    /// `/works`: health probe.
    HealthProbe,
    /// Everything else: fetched from the asset origin.
    Asset { path: &'a str },
}

impl Route<'_> {
    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Route::Proxy { .. } => "proxy",
            Route::OutdatedClient => "outdated_client",
            Route::WebSocket => "websocket",
            Route::HealthProbe => "health",
            Route::Asset { .. } => "asset",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RouteKind {
    Proxy,
    OutdatedClient,
    WebSocket,
    HealthProbe,
}

const ROUTES: [(PathMatcher, RouteKind); 4] = [
    (PathMatcher::Prefix("/http/"), RouteKind::Proxy),
    (PathMatcher::Exact("/http"), RouteKind::OutdatedClient),
    (PathMatcher::Exact("/ws"), RouteKind::WebSocket),
    (PathMatcher::Exact("/works"), RouteKind::HealthProbe),
];

/// Resolve a raw path-and-query (e.g. `/http/https://example.com/?a=1`).
pub fn resolve(path_and_query: &str) -> Route<'_> {
    for (matcher, kind) in ROUTES.iter() {
        if let Some(rest) = matcher.strip(path_and_query) {
            return match kind {
                RouteKind::Proxy => Route::Proxy { target: rest },
                RouteKind::OutdatedClient => Route::OutdatedClient,
                RouteKind::WebSocket => Route::WebSocket,
                RouteKind::HealthProbe => Route::HealthProbe,
            };
        }
    }
    Route::Asset { path: path_and_query }
}
