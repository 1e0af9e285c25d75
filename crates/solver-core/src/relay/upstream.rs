//! Upstream invocation adapter for the generative-language endpoint.
//!
//! Both invocation modes share one URL scheme:
//! `{base}/{version}/models/{model}:{method}`. The credential travels in the
//! `x-goog-api-key` header so it never appears in URLs or access logs.

use reqwest::Client;
use serde_json::Value;

use crate::error::{AppError, AppResult};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const API_VERSION: &str = "v1beta";

fn resolve_base_url(explicit: Option<String>) -> String {
    let Some(raw) = explicit else {
        return DEFAULT_BASE_URL.to_string();
    };
    let candidate = raw.trim().trim_end_matches('/').to_string();
    if candidate.is_empty() {
        tracing::warn!("Upstream URL override is empty, using default endpoint");
        return DEFAULT_BASE_URL.to_string();
    }
    if url::Url::parse(&candidate).is_err() {
        tracing::warn!("Upstream URL override is not a valid URL, using default endpoint");
        return DEFAULT_BASE_URL.to_string();
    }
    tracing::info!("Using custom upstream URL");
    candidate
}

pub struct UpstreamClient {
    http_client: Client,
    base_url: String,
}

impl UpstreamClient {
    /// Create a new `UpstreamClient` with the given HTTP client.
    ///
    /// Accepts a pre-built `reqwest::Client` so TLS initialization happens
    /// once at startup. No request timeout is applied: streaming responses
    /// stay open for as long as the model generates, and the transport's own
    /// limits are the only backstop.
    pub fn new(http_client: Client, base_url: Option<String>) -> Self {
        Self { http_client, base_url: resolve_base_url(base_url) }
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/{}/models/{}:{}", self.base_url, API_VERSION, model, method)
    }

    /// Blocking invocation: one `generateContent` request/response.
    pub async fn generate(
        &self,
        api_key: &str,
        model: &str,
        body: &Value,
    ) -> AppResult<reqwest::Response> {
        let response = self
            .http_client
            .post(self.endpoint(model, "generateContent"))
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await?;
        Ok(response)
    }

    /// Streaming invocation: `streamGenerateContent` with an SSE response
    /// body. The returned response's byte stream is live; dropping it aborts
    /// the underlying connection.
    pub async fn stream_generate(
        &self,
        api_key: &str,
        model: &str,
        body: &Value,
    ) -> AppResult<reqwest::Response> {
        let response = self
            .http_client
            .post(self.endpoint(model, "streamGenerateContent"))
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await?;
        Ok(response)
    }

    /// Decode an upstream non-2xx response into a terminal error value.
    ///
    /// The upstream error body is JSON of the form
    /// `{"error": {"message": ...}}` when well-formed; anything else is kept
    /// verbatim as details-free message context.
    pub async fn decode_error(response: reqwest::Response) -> AppError {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_else(|_| format!("HTTP {status}"));
        let details: Option<Value> = serde_json::from_str(&text).ok();
        let message = details
            .as_ref()
            .and_then(|v| v.get("error"))
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| "Upstream API error.".to_string());
        AppError::Upstream { status, message, details }
    }
}
