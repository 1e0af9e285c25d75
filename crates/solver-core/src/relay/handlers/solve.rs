//! `/api/solve` and `/api/solve-stream` handlers.

use axum::{
    body::Body,
    extract::{Extension, Multipart, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use bytes::Bytes;
use serde_json::Value;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use solver_types::protocol::{ErrorBody, SolveResponse};

use crate::error::AppError;
use crate::relay::request::{SolveForm, SolvePayload};
use crate::relay::security::CallerIdentity;
use crate::relay::server::AppState;
use crate::relay::stream::{blocking_answer, run_relay, RelayJob};
use crate::relay::upstream::UpstreamClient;

/// Error response shape shared by both endpoints (and by the stream
/// endpoint before any SSE bytes have been written).
pub type ApiError = (StatusCode, Json<ErrorBody>);

fn map_app_error(err: AppError) -> ApiError {
    match err {
        AppError::Request(message) => (StatusCode::BAD_REQUEST, Json(ErrorBody::new(message))),
        AppError::Config(message) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::new(message)))
        }
        AppError::Upstream { status, message, details } => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            Json(ErrorBody { error: message, details }),
        ),
        AppError::Network(e) => {
            (StatusCode::BAD_GATEWAY, Json(ErrorBody::new(format!("Upstream request failed: {e}"))))
        }
        err => (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::new(err.to_string()))),
    }
}

/// Shared front half of both endpoints: read the form, validate it, and
/// resolve the effective upstream credential.
async fn prepare(
    state: &AppState,
    caller: CallerIdentity,
    multipart: Multipart,
) -> Result<(SolvePayload, String), ApiError> {
    let form = SolveForm::read(multipart).await.map_err(map_app_error)?;
    let payload = SolvePayload::build(&form).map_err(map_app_error)?;
    let api_key = state
        .resolve_credential(caller, form.api_key.as_deref())
        .await
        .map_err(map_app_error)?;
    info!("[Solve] Request: {} ({} images)", payload.model, form.images.len());
    Ok((payload, api_key))
}

pub async fn handle_solve(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    multipart: Multipart,
) -> Result<Json<SolveResponse>, ApiError> {
    let (payload, api_key) = prepare(&state, caller, multipart).await?;

    let response = state
        .upstream
        .generate(&api_key, &payload.model, &payload.body)
        .await
        .map_err(map_app_error)?;

    if !response.status().is_success() {
        return Err(map_app_error(UpstreamClient::decode_error(response).await));
    }

    let body: Value =
        response.json().await.map_err(|e| map_app_error(AppError::Network(e)))?;
    let (answer, usage) = blocking_answer(&body);
    let answer =
        if answer.is_empty() { "No answer returned.".to_string() } else { answer };

    Ok(Json(SolveResponse { answer, usage, model: payload.model }))
}

pub async fn handle_solve_stream(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let (payload, api_key) = prepare(&state, caller, multipart).await?;

    let response = state
        .upstream
        .stream_generate(&api_key, &payload.model, &payload.body)
        .await
        .map_err(map_app_error)?;

    // Upstream refused before streaming started: plain JSON error, no SSE.
    if !response.status().is_success() {
        return Err(map_app_error(UpstreamClient::decode_error(response).await));
    }

    let job = RelayJob {
        upstream: state.upstream.clone(),
        api_key,
        model: payload.model.clone(),
        body: payload.body.clone(),
    };
    let (tx, mut rx) = mpsc::channel(32);
    let cancel = CancellationToken::new();
    tokio::spawn(run_relay(response.bytes_stream(), job, tx, cancel.clone()));

    // Dropping the response body (caller gone) trips the guard, which
    // cancels the relay task and thereby aborts the upstream connection.
    let guard = cancel.drop_guard();
    let body_stream = async_stream::stream! {
        let _guard = guard;
        while let Some(event) = rx.recv().await {
            yield Ok::<Bytes, Infallible>(event.to_sse_bytes());
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache, no-transform")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(body_stream))
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new(format!("Response build error: {e}"))),
            )
        })
}
