//! CORS relay.
//!
//! # Architecture Overview
//!
//! ```text
//!     Browser ──▶ net (plain/TLS) ──▶ http server ──▶ routing
//!                                                       │
//!                      ┌──────────────┬─────────────────┼──────────────┐
//!                      ▼              ▼                 ▼              ▼
//!                 /http/<url>    /http, /ws, /works   OPTIONS        other
//!                 relay core     fixed answers        preflight      asset origin
//!                      │
//!      params → dispatch → headers → integrity (retry) → redirect remap
//! ```

use std::path::PathBuf;

use clap::Parser;

use cors_relay::config::loader::{read_config, ConfigError};
use cors_relay::config::validation::validate_config;
use cors_relay::lifecycle::startup;
use cors_relay::observability::logging::init_logging;
use cors_relay::RelayConfig;

#[derive(Parser)]
#[command(name = "cors-relay")]
#[command(about = "Public relay restoring allow-all CORS on cross-origin fetches", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted
    #[arg(short, long, env = "CORS_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen port, replacing the port of the configured bind address
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => RelayConfig::default(),
    };
    if let Some(port) = cli.port {
        config = config.with_port(port);
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        asset_origin = %config.asset.origin,
        max_retry = config.relay.max_retry,
        "cors-relay starting"
    );

    startup::run(config).await?;
    Ok(())
}
