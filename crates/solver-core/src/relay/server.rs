//! Axum application state, router assembly, and the relay server runner.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::error::AppResult;
use crate::relay::config::RelayConfig;
use crate::relay::credential::resolve_credential;
use crate::relay::handlers;
use crate::relay::security::{caller_auth_middleware, CallerIdentity, RelaySecurityConfig};
use crate::relay::upstream::UpstreamClient;

/// Whole-request body cap. Individual images are limited separately during
/// multipart reading; this only bounds the aggregate.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Shared application state, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<UpstreamClient>,
    /// System-wide shared upstream key. Writes belong to the external admin
    /// surface; in-flight calls read whatever value is current.
    shared_key: Arc<RwLock<Option<String>>>,
    default_key: Option<String>,
    pub security: Arc<RwLock<RelaySecurityConfig>>,
}

impl AppState {
    pub fn new(config: &RelayConfig) -> AppResult<Self> {
        let http_client = reqwest::Client::builder().build()?;
        Ok(Self {
            upstream: Arc::new(UpstreamClient::new(http_client, config.upstream_url.clone())),
            shared_key: Arc::new(RwLock::new(config.shared_api_key.clone())),
            default_key: config.default_api_key.clone(),
            security: Arc::new(RwLock::new(config.security.clone())),
        })
    }

    /// Effective upstream credential for one call (see
    /// [`crate::relay::credential`] for the precedence rules).
    pub async fn resolve_credential(
        &self,
        caller: CallerIdentity,
        supplied: Option<&str>,
    ) -> AppResult<String> {
        let shared = self.shared_key.read().await;
        resolve_credential(caller, supplied, shared.as_deref(), self.default_key.as_deref())
    }

    /// Admin seam: replace the system-wide shared key.
    pub async fn set_shared_key(&self, key: Option<String>) {
        let mut shared = self.shared_key.write().await;
        *shared = key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty());
    }

    pub async fn shared_key(&self) -> Option<String> {
        self.shared_key.read().await.clone()
    }
}

/// Build the relay router around a pre-created state, so external code can
/// keep handles for runtime updates (shared key, security config).
pub fn build_relay_router_with_shared_state(state: AppState) -> Router<()> {
    Router::new()
        .route("/api/solve", post(handlers::handle_solve))
        .route("/api/solve-stream", post(handlers::handle_solve_stream))
        .layer(axum::middleware::from_fn_with_state(
            state.security.clone(),
            caller_auth_middleware,
        ))
        .route("/health", get(handlers::handle_health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Helper for simpler usage when no runtime handles are needed.
pub fn build_relay_router(config: &RelayConfig) -> AppResult<Router<()>> {
    Ok(build_relay_router_with_shared_state(AppState::new(config)?))
}

/// The relay HTTP server.
pub struct RelayServer {
    config: RelayConfig,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        tracing::info!("Starting relay server on {}", addr);

        let app = build_relay_router(&self.config)?;

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
