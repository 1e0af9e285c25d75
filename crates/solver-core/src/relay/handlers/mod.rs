//! HTTP handlers for the relay surface.

pub mod solve;

use axum::{response::IntoResponse, Json};

pub use solve::{handle_solve, handle_solve_stream};

/// Liveness probe for deployment and monitoring.
pub async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({"ok": true}))
}
