//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the single entry handler
//! - Wire up middleware (preflight, https upgrade, timeout, request ID, trace)
//! - Bind the server to a plain or TLS listener
//! - Dispatch requests to the routing table and the proxy core
//!
//! # Layer order (outermost first)
//! ```text
//! CatchPanic → SetRequestId → Trace → PropagateRequestId
//!     → allow-origin / --ver defaults → Timeout → https upgrade → preflight → handler
//! ```

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderName, HeaderValue, Request},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::RelayConfig;
use crate::http::asset::AssetOrigin;
use crate::http::middleware::{https_upgrade_middleware, preflight_middleware};
use crate::http::request::{request_id, UuidRequestId};
use crate::http::response;
use crate::lifecycle::shutdown;
use crate::observability::metrics;
use crate::relay::headers::VERSION_MARKER;
use crate::relay::{OutboundDispatcher, RelayCore, RelayError};
use crate::routing::{self, Route};

/// How long in-flight TLS connections may drain after shutdown.
const TLS_DRAIN_SECS: u64 = 10;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<RelayCore>,
    pub assets: Arc<AssetOrigin>,
}

/// Failure building the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP server for the relay.
pub struct HttpServer {
    router: Router,
    config: RelayConfig,
}

impl HttpServer {
    /// Create a server with its own upstream and asset clients.
    pub fn new(config: RelayConfig) -> Result<Self, ServerError> {
        let dispatcher = OutboundDispatcher::new(&config.timeouts)?;
        let assets = AssetOrigin::new(&config.asset, &config.timeouts)?;
        Ok(Self::with_upstreams(config, dispatcher, assets))
    }

    /// Create a server around prepared upstream clients.
    pub fn with_upstreams(config: RelayConfig, dispatcher: OutboundDispatcher, assets: AssetOrigin) -> Self {
        let state = AppState {
            core: Arc::new(RelayCore::new(&config, dispatcher)),
            assets: Arc::new(assets),
        };
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &RelayConfig, state: AppState) -> Router {
        let security = Arc::new(config.security.clone());

        Router::new()
            .route("/{*path}", any(entry_handler))
            .route("/", any(entry_handler))
            .with_state(state)
            .layer(middleware::from_fn(preflight_middleware))
            .layer(middleware::from_fn_with_state(security, https_upgrade_middleware))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(SetResponseHeaderLayer::if_not_present(
                HeaderName::from_static(VERSION_MARKER),
                HeaderValue::from(config.relay.version),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            ))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(CatchPanicLayer::custom(handle_panic))
    }

    /// The fully layered router, for serving or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Serve plain HTTP on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS on `addr` until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            shutdown::wait(shutdown).await;
            drain.graceful_shutdown(Some(Duration::from_secs(TLS_DRAIN_SECS)));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Single entry point: resolves the route and answers it.
async fn entry_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(request.headers()).to_string();
    let method = request.method().clone();
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let route = routing::resolve(&path_and_query);

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        route = route.label(),
        path = %path_and_query,
        "Handling request"
    );

    let result = match route {
        Route::Proxy { target } => state.core.handle(request, target).await,
        Route::Asset { path } => state.assets.fetch(path).await,
        Route::OutdatedClient => Ok(response::outdated_client()),
        Route::WebSocket => Ok(response::websocket_unsupported()),
        Route::HealthProbe => Ok(response::health_probe()),
    };

    let response = match result {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                route = route.label(),
                kind = e.kind(),
                error = ?e,
                "Request failed"
            );
            metrics::record_error(e.kind());
            e.into_response()
        }
    };

    metrics::record_request(route.label(), response.status().as_u16(), start_time);
    response
}

/// Turn a handler panic into an ordinary 502.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(detail = %detail, "Handler panicked");
    metrics::record_error("internal");
    RelayError::Internal(detail).into_response()
}
