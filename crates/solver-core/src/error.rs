//! Unified error types for the Solver relay core.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Main error type for relay operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AppError {
    /// Network request failed (HTTP client).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation failed, including the case where
    /// no upstream API key is resolvable for a call.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller's request was rejected before reaching upstream.
    #[error("Invalid request: {0}")]
    Request(String),

    /// Upstream returned a well-formed non-2xx response.
    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String, details: Option<Value> },
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

/// Result type alias for relay operations.
pub type AppResult<T> = Result<T, AppError>;

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Config(s)
    }
}
