//! Relay configuration resolved from the environment at startup.

use crate::relay::security::RelaySecurityConfig;

pub const DEFAULT_PORT: u16 = 8065;

/// Startup configuration for the relay server.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Explicit upstream base URL; `None` means the built-in endpoint.
    pub upstream_url: Option<String>,
    /// Deployment-level default upstream key (lowest resolution precedence).
    pub default_api_key: Option<String>,
    /// Initial system-wide shared key; the admin surface may replace it at
    /// runtime through [`crate::relay::server::AppState::set_shared_key`].
    pub shared_api_key: Option<String>,
    pub security: RelaySecurityConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            upstream_url: None,
            default_api_key: None,
            shared_api_key: None,
            security: RelaySecurityConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Resolve configuration from environment variables.
    ///
    /// Unset or empty variables fall back to defaults; an unparseable port
    /// falls back to [`DEFAULT_PORT`] with a warning rather than aborting.
    pub fn from_env() -> Self {
        let port = match std::env::var("SOLVER_PORT") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!("SOLVER_PORT is not a valid port, using {}", DEFAULT_PORT);
                DEFAULT_PORT
            }),
            Err(_) => DEFAULT_PORT,
        };

        Self {
            host: env_nonempty("SOLVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            upstream_url: env_nonempty("SOLVER_UPSTREAM_URL"),
            default_api_key: env_nonempty("GEMINI_API_KEY"),
            shared_api_key: env_nonempty("SOLVER_SHARED_API_KEY"),
            security: RelaySecurityConfig {
                caller_key: env_nonempty("SOLVER_CALLER_KEY"),
                admin_key: env_nonempty("SOLVER_ADMIN_KEY"),
            },
        }
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
