//! Solver Server - Headless Daemon
//!
//! A pure Rust HTTP server that:
//! - Relays solve requests to the generative endpoint on /api/solve*
//! - Streams answers back as SSE with blocking fallback
//! - Exposes a /health probe for deployment checks
//!
//! Configuration is environment-driven; see `RelayConfig::from_env`.

use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use solver_core::relay::{build_relay_router_with_shared_state, AppState, RelayConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RelayConfig::from_env();
    info!("Solver server starting on port {}...", config.port);

    if config.default_api_key.is_none() && config.shared_api_key.is_none() {
        tracing::warn!(
            "No GEMINI_API_KEY or SOLVER_SHARED_API_KEY set; only privileged callers \
             supplying their own key will be able to solve"
        );
    }

    let state = AppState::new(&config).map_err(|e| anyhow::anyhow!("state init failed: {e}"))?;
    let app = build_relay_router_with_shared_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen address: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Relay listening on http://{}", addr);
    info!("Solve endpoints at http://{}/api/solve and /api/solve-stream", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
