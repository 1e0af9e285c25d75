//! Stream relay state machine and fallback completion guard.
//!
//! Per streaming call: `STREAMING -> (DONE | FALLBACK -> DONE | ERROR)`.
//! The driver owns the upstream byte stream, re-frames it through a
//! [`StreamSession`], and forwards simplified events over a channel. A
//! per-call [`CancellationToken`] aborts the upstream connection as soon as
//! the caller disappears; nothing is emitted after cancellation.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use solver_types::protocol::{ChunkEvent, DoneEvent, ErrorEvent};

use crate::error::AppError;
use crate::relay::events;
use crate::relay::sse::{decode_frame, Frame, FrameAssembler};
use crate::relay::upstream::UpstreamClient;

/// One outgoing event of the simplified stream protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Chunk(ChunkEvent),
    Done(DoneEvent),
    Error(ErrorEvent),
}

impl RelayEvent {
    /// Wire encoding: `event: <name>\ndata: <json>\n\n`.
    pub fn to_sse_bytes(&self) -> Bytes {
        let (name, data) = match self {
            Self::Chunk(payload) => ("chunk", serde_json::to_string(payload)),
            Self::Done(payload) => ("done", serde_json::to_string(payload)),
            Self::Error(payload) => ("error", serde_json::to_string(payload)),
        };
        Bytes::from(format!("event: {}\ndata: {}\n\n", name, data.unwrap_or_default()))
    }
}

/// Ephemeral per-call relay state: byte reassembly plus the accumulated
/// answer, last-seen usage metadata, and last-seen block reason.
#[derive(Debug, Default)]
pub struct StreamSession {
    assembler: FrameAssembler,
    answer: String,
    usage: Option<Value>,
    block_reason: Option<String>,
}

impl StreamSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw upstream bytes; returns the text deltas completed by them.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let frames = self.assembler.push(chunk);
        frames.iter().flat_map(|frame| self.handle_frame(frame)).collect()
    }

    /// Flush the trailing unterminated frame at stream end.
    pub fn finish(&mut self) -> Vec<String> {
        match self.assembler.flush() {
            Some(frame) => self.handle_frame(&frame),
            None => Vec::new(),
        }
    }

    fn handle_frame(&mut self, frame: &Frame) -> Vec<String> {
        let mut deltas = Vec::new();
        for payload in decode_frame(frame) {
            for item in events::payload_items(&payload) {
                if let Some(usage) = events::extract_usage(item) {
                    self.usage = Some(usage.clone());
                }
                if let Some(reason) = events::extract_block_reason(item) {
                    self.block_reason = Some(reason);
                }
            }
            let text = events::extract_text(&payload);
            if !text.is_empty() {
                self.answer.push_str(&text);
                deltas.push(text);
            }
        }
        deltas
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn usage(&self) -> Option<&Value> {
        self.usage.as_ref()
    }

    pub fn block_reason(&self) -> Option<&str> {
        self.block_reason.as_deref()
    }
}

/// Everything a relay task needs to finish one streaming call, including
/// the material for the single fallback invocation.
pub struct RelayJob {
    pub upstream: Arc<UpstreamClient>,
    pub api_key: String,
    pub model: String,
    pub body: Value,
}

/// Drive one upstream byte stream to completion.
///
/// Text deltas are forwarded as `chunk` events the moment a frame decodes;
/// at stream end either `done` is emitted or the fallback guard runs. The
/// receiver hanging up or `cancel` firing stops everything silently — a
/// cancelled call emits no terminal event and aborts the upstream
/// connection by dropping its stream.
pub async fn run_relay<S>(
    mut upstream_stream: S,
    job: RelayJob,
    tx: mpsc::Sender<RelayEvent>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    let mut session = StreamSession::new();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("Caller disconnected, aborting upstream stream");
                return;
            }
            item = upstream_stream.next() => match item {
                Some(Ok(bytes)) => {
                    for delta in session.push(&bytes) {
                        if tx.send(RelayEvent::Chunk(ChunkEvent { text: delta })).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    // Mid-stream transport failure: whatever was accumulated
                    // decides between done and fallback, same as a clean end.
                    tracing::warn!("Upstream stream error: {}", e);
                    break;
                }
                None => break,
            }
        }
    }
    drop(upstream_stream);

    for delta in session.finish() {
        if tx.send(RelayEvent::Chunk(ChunkEvent { text: delta })).await.is_err() {
            return;
        }
    }

    if cancel.is_cancelled() {
        return;
    }

    if !session.answer().is_empty() {
        let done = DoneEvent { usage: session.usage().cloned(), model: job.model.clone() };
        let _ = tx.send(RelayEvent::Done(done)).await;
        return;
    }

    // Streaming produced nothing usable; one blocking retry, then give up.
    match fallback_completion(&job, &session).await {
        FallbackOutcome::Answer { text, usage } => {
            if tx.send(RelayEvent::Chunk(ChunkEvent { text })).await.is_ok() {
                let done = DoneEvent { usage, model: job.model.clone() };
                let _ = tx.send(RelayEvent::Done(done)).await;
            }
        }
        FallbackOutcome::Failed(error) => {
            let _ = tx.send(RelayEvent::Error(error)).await;
        }
    }
}

enum FallbackOutcome {
    Answer { text: String, usage: Option<Value> },
    Failed(ErrorEvent),
}

/// Fallback completion guard: exactly one blocking call with the same body.
///
/// A block/safety reason captured during the streaming attempt outranks the
/// generic failure message — the caller should learn *why* there was no
/// text, not just that the retry failed too.
async fn fallback_completion(job: &RelayJob, session: &StreamSession) -> FallbackOutcome {
    tracing::info!("Stream yielded no text, falling back to blocking call");

    let response = match job.upstream.generate(&job.api_key, &job.model, &job.body).await {
        Ok(response) => response,
        Err(e) => {
            return FallbackOutcome::Failed(ErrorEvent {
                status: 502,
                message: blocked_message(session, &e.to_string()),
                details: None,
            });
        }
    };

    if !response.status().is_success() {
        let err = UpstreamClient::decode_error(response).await;
        let AppError::Upstream { status, message, details } = err else {
            return FallbackOutcome::Failed(ErrorEvent {
                status: 502,
                message: blocked_message(session, &err.to_string()),
                details: None,
            });
        };
        return FallbackOutcome::Failed(ErrorEvent {
            status,
            message: blocked_message(session, &message),
            details,
        });
    }

    let payload: Value = match response.json().await {
        Ok(payload) => payload,
        Err(e) => {
            return FallbackOutcome::Failed(ErrorEvent {
                status: 502,
                message: format!("Unreadable upstream response: {e}"),
                details: None,
            });
        }
    };

    let text = events::extract_text(&payload).trim().to_string();
    if text.is_empty() {
        let reason = events::payload_items(&payload)
            .into_iter()
            .find_map(events::extract_block_reason)
            .or_else(|| session.block_reason().map(str::to_string));
        let message = match reason {
            Some(reason) => format!("Model returned no displayable text ({reason})"),
            None => "Model returned no displayable text".to_string(),
        };
        return FallbackOutcome::Failed(ErrorEvent { status: 502, message, details: None });
    }

    let usage = events::payload_items(&payload)
        .into_iter()
        .find_map(events::extract_usage)
        .cloned()
        .or_else(|| session.usage().cloned());
    FallbackOutcome::Answer { text, usage }
}

fn blocked_message(session: &StreamSession, fallback_message: &str) -> String {
    match session.block_reason() {
        Some(reason) => format!("Generation blocked ({reason})"),
        None => fallback_message.to_string(),
    }
}

/// Decode a full (non-incremental) upstream body the same way the stream
/// path would, for the blocking endpoint.
pub fn blocking_answer(payload: &Value) -> (String, Option<Value>) {
    let answer = events::extract_text(payload).trim().to_string();
    let usage =
        events::payload_items(payload).into_iter().find_map(events::extract_usage).cloned();
    (answer, usage)
}
