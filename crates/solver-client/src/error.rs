//! Error types for the Solver client.

use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when using the Solver client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP request failed at the transport level (connect, TLS, read).
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The relay returned a well-formed failure response.
    #[error("Relay error ({status}): {message}")]
    Api {
        /// HTTP status (or the status carried by a stream `error` event).
        status: u16,
        /// Error message from the relay.
        message: String,
        /// Raw details body, when the relay attached one.
        details: Option<Value>,
    },

    /// Relay returned an invalid or unparseable response.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Error occurred during SSE streaming.
    #[error("Stream error: {0}")]
    Stream(String),

    /// The request carries neither a prompt nor images; nothing was sent.
    #[error("Provide a question or at least one image")]
    EmptyRequest,

    /// Rotation-state persistence failed.
    #[error("Rotation store error: {0}")]
    Storage(String),
}
