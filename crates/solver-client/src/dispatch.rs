//! Attempt dispatcher: walks the rotation queue until one relay call
//! succeeds.
//!
//! Strictly sequential — two keys racing the same request would spend two
//! quotas and leave an ambiguous winner. Invalid-set updates are persisted
//! as they happen, so a partial walk still leaves its classifications
//! behind.

use tracing::{debug, warn};

use solver_types::credential::mask_key;
use solver_types::protocol::SolveResponse;

use crate::classify;
use crate::client::SolverClient;
use crate::error::ClientError;
use crate::rotation::{Attempt, RotationStore};
use crate::types::SolveRequest;

pub struct Dispatcher<S: RotationStore> {
    client: SolverClient,
    store: S,
}

enum Mode<'c> {
    Blocking,
    Streaming(&'c mut (dyn FnMut(&str) + Send)),
}

impl<S: RotationStore> Dispatcher<S> {
    pub fn new(client: SolverClient, store: S) -> Self {
        Self { client, store }
    }

    pub fn client(&self) -> &SolverClient {
        &self.client
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Blocking solve across the rotation queue.
    pub async fn solve(&self, request: &SolveRequest) -> Result<SolveResponse, ClientError> {
        self.dispatch(request, Mode::Blocking).await
    }

    /// Streaming solve across the rotation queue.
    ///
    /// `on_chunk` observes deltas from every attempt, including ones that
    /// later fail; renderers should reset their buffer when a new attempt
    /// begins producing output, exactly as they would for a reconnect.
    pub async fn solve_stream(
        &self,
        request: &SolveRequest,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<SolveResponse, ClientError> {
        self.dispatch(request, Mode::Streaming(on_chunk)).await
    }

    async fn dispatch(
        &self,
        request: &SolveRequest,
        mut mode: Mode<'_>,
    ) -> Result<SolveResponse, ClientError> {
        if request.is_empty() {
            return Err(ClientError::EmptyRequest);
        }

        let mut state = self.store.load().await?;
        let queue = state.build_queue();
        let mut last_error: Option<ClientError> = None;

        for attempt in queue {
            let api_key = attempt.key();
            let label = api_key.map(mask_key).unwrap_or_else(|| "<server default>".to_string());

            let outcome = match &mut mode {
                Mode::Blocking => self.client.solve(request, api_key).await,
                Mode::Streaming(on_chunk) => {
                    self.client.solve_stream(request, api_key, &mut **on_chunk).await
                }
            };

            match outcome {
                Ok(response) => {
                    if let Attempt::Key(key) = &attempt {
                        state.clear_invalid(key);
                        state.advance_cursor(key);
                        self.persist(&state).await;
                    }
                    debug!("Attempt with {} succeeded", label);
                    return Ok(response);
                }
                Err(ClientError::Api { status, message, details }) => {
                    debug!("Attempt with {} failed ({}): {}", label, status, message);
                    if let Attempt::Key(key) = &attempt {
                        if classify::is_credential_error(status, &message) {
                            state.mark_invalid(key, classify::invalid_reason(status, &message));
                            self.persist(&state).await;
                        }
                    }
                    last_error = Some(ClientError::Api { status, message, details });
                }
                Err(transport) => {
                    // Could not complete the call at all: not the key's
                    // fault, move on.
                    debug!("Attempt with {} failed in transport: {}", label, transport);
                    last_error = Some(transport);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ClientError::Stream("no attempt produced a response".to_string())
        }))
    }

    /// Best-effort state persistence: a failed save never overrides the
    /// outcome of the attempt itself.
    async fn persist(&self, state: &crate::rotation::RotationState) {
        if let Err(e) = self.store.save(state).await {
            warn!("Failed to persist rotation state: {}", e);
        }
    }
}
