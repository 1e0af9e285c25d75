//! HTTP and SSE message shapes for the solve endpoints.
//!
//! The streaming protocol is deliberately small: any number of `chunk`
//! events followed by exactly one of `done` or `error`. Upstream usage
//! metadata is passed through opaquely as JSON; the relay never interprets
//! it beyond "last seen wins".

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Successful body of `POST /api/solve`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolveResponse {
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    pub model: String,
}

/// Error body of any non-2xx solve response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self { error: message.into(), details: None }
    }

    pub fn with_details(message: impl Into<String>, details: Value) -> Self {
        Self { error: message.into(), details: Some(details) }
    }
}

/// Payload of a `chunk` SSE event: one display-text delta.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkEvent {
    pub text: String,
}

/// Payload of the terminal `done` SSE event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoneEvent {
    pub usage: Option<Value>,
    pub model: String,
}

/// Payload of the terminal `error` SSE event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorEvent {
    pub status: u16,
    pub message: String,
    pub details: Option<Value>,
}
