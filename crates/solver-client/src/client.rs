//! HTTP client for the relay's two solve operations.

use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::Client;

use solver_types::protocol::{ChunkEvent, DoneEvent, ErrorBody, ErrorEvent, SolveResponse};

use crate::error::ClientError;
use crate::types::{ClientConfig, SolveRequest};

pub struct SolverClient {
    client: Client,
    config: ClientConfig,
}

impl SolverClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder().connect_timeout(config.connect_timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn build_form(request: &SolveRequest, api_key: Option<&str>) -> Form {
        let mut form = Form::new();
        if let Some(key) = api_key {
            form = form.text("apiKey", key.to_string());
        }
        if let Some(model) = &request.model {
            form = form.text("model", model.clone());
        }
        if let Some(prompt) = &request.prompt {
            form = form.text("prompt", prompt.clone());
        }
        for image in &request.images {
            let part = Part::bytes(image.bytes.clone())
                .file_name(image.file_name.clone())
                .mime_str(&image.mime_type)
                .unwrap_or_else(|_| {
                    Part::bytes(image.bytes.clone()).file_name(image.file_name.clone())
                });
            form = form.part("image", part);
        }
        form
    }

    fn request(&self, path: &str, request: &SolveRequest, api_key: Option<&str>) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(format!("{}{}", self.config.base_url, path))
            .multipart(Self::build_form(request, api_key));
        if let Some(caller_key) = &self.config.caller_key {
            builder = builder.header("Authorization", format!("Bearer {caller_key}"));
        }
        builder
    }

    /// Read a non-2xx relay response into the API error shape.
    async fn decode_failure(response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        let body: Option<ErrorBody> = response.json().await.ok();
        match body {
            Some(body) => {
                ClientError::Api { status, message: body.error, details: body.details }
            }
            None => ClientError::Api {
                status,
                message: "Request failed.".to_string(),
                details: None,
            },
        }
    }

    /// Blocking solve: one request, one full answer.
    pub async fn solve(
        &self,
        request: &SolveRequest,
        api_key: Option<&str>,
    ) -> Result<SolveResponse, ClientError> {
        let response = self.request("/api/solve", request, api_key).send().await?;

        if !response.status().is_success() {
            return Err(Self::decode_failure(response).await);
        }

        response.json().await.map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    /// Streaming solve: `on_chunk` observes each text delta as it arrives;
    /// the assembled answer is returned when the stream terminates with
    /// `done`. A stream `error` event (or a stream that ends without a
    /// terminal event) fails the call.
    pub async fn solve_stream(
        &self,
        request: &SolveRequest,
        api_key: Option<&str>,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<SolveResponse, ClientError> {
        let response = self.request("/api/solve-stream", request, api_key).send().await?;

        if !response.status().is_success() {
            return Err(Self::decode_failure(response).await);
        }

        let mut answer = String::new();
        let mut events = response.bytes_stream().eventsource();

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| ClientError::Stream(e.to_string()))?;
            match event.event.as_str() {
                "chunk" => {
                    let chunk: ChunkEvent = serde_json::from_str(&event.data)
                        .map_err(|e| ClientError::Stream(format!("bad chunk event: {e}")))?;
                    if !chunk.text.is_empty() {
                        answer.push_str(&chunk.text);
                        on_chunk(&chunk.text);
                    }
                }
                "done" => {
                    let done: DoneEvent = serde_json::from_str(&event.data)
                        .map_err(|e| ClientError::Stream(format!("bad done event: {e}")))?;
                    return Ok(SolveResponse { answer, usage: done.usage, model: done.model });
                }
                "error" => {
                    let err: ErrorEvent = serde_json::from_str(&event.data)
                        .map_err(|e| ClientError::Stream(format!("bad error event: {e}")))?;
                    return Err(ClientError::Api {
                        status: err.status,
                        message: err.message,
                        details: err.details,
                    });
                }
                other => {
                    tracing::debug!("Ignoring unknown stream event: {}", other);
                }
            }
        }

        Err(ClientError::Stream("stream ended without a terminal event".to_string()))
    }
}
