//! Solve request validation and upstream request-body construction.

use axum::extract::Multipart;
use base64::Engine;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const MAX_IMAGES: usize = 6;
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/webp"];

/// One uploaded image part, kept in input order.
#[derive(Debug, Clone)]
pub struct ImagePart {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// The raw multipart fields of a solve call.
#[derive(Debug, Default)]
pub struct SolveForm {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub images: Vec<ImagePart>,
}

impl SolveForm {
    /// Drain an axum multipart body into a [`SolveForm`].
    ///
    /// Unknown fields are skipped; image count and per-image size limits are
    /// enforced here, before anything is validated or forwarded.
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Request(format!("malformed multipart body: {e}")))?
        {
            match field.name().unwrap_or_default() {
                "apiKey" => {
                    form.api_key = Some(text_field(field).await?);
                }
                "model" => {
                    form.model = Some(text_field(field).await?);
                }
                "prompt" => {
                    form.prompt = Some(text_field(field).await?);
                }
                "image" => {
                    if form.images.len() >= MAX_IMAGES {
                        return Err(AppError::Request(format!(
                            "at most {MAX_IMAGES} images per request"
                        )));
                    }
                    let mime_type = field.content_type().unwrap_or_default().to_string();
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::Request(format!("failed to read image: {e}")))?;
                    if bytes.len() > MAX_IMAGE_BYTES {
                        return Err(AppError::Request("image exceeds the 10 MiB limit".into()));
                    }
                    form.images.push(ImagePart { mime_type, bytes: bytes.to_vec() });
                }
                other => {
                    tracing::debug!("Ignoring unknown multipart field: {}", other);
                }
            }
        }
        Ok(form)
    }
}

/// A validated solve request, ready for upstream invocation.
#[derive(Debug, Clone)]
pub struct SolvePayload {
    pub model: String,
    pub prompt: String,
    pub body: Value,
}

impl SolvePayload {
    /// Validate a form and build the upstream request body: a text part (if
    /// a prompt is present) followed by one inline-data part per image, in
    /// input order.
    pub fn build(form: &SolveForm) -> AppResult<Self> {
        let prompt = form.prompt.as_deref().unwrap_or_default().trim().to_string();

        if prompt.is_empty() && form.images.is_empty() {
            return Err(AppError::Request("provide a question or upload an image".into()));
        }
        if form.images.iter().any(|img| !is_supported_image(&img.mime_type)) {
            return Err(AppError::Request("only PNG/JPEG/WebP images are supported".into()));
        }

        let mut parts = Vec::with_capacity(1 + form.images.len());
        if !prompt.is_empty() {
            parts.push(json!({ "text": prompt }));
        }
        for image in &form.images {
            parts.push(json!({
                "inline_data": {
                    "mime_type": image.mime_type,
                    "data": base64::engine::general_purpose::STANDARD.encode(&image.bytes),
                }
            }));
        }

        Ok(Self {
            model: normalize_model_name(form.model.as_deref()),
            prompt,
            body: json!({ "contents": [{ "role": "user", "parts": parts }] }),
        })
    }
}

pub fn is_supported_image(mime_type: &str) -> bool {
    ALLOWED_IMAGE_TYPES.contains(&mime_type)
}

/// Trim, strip a leading `models/`, and fall back to the default model.
pub fn normalize_model_name(model: Option<&str>) -> String {
    let value = model.unwrap_or_default().trim();
    let normalized = value.strip_prefix("models/").unwrap_or(value).trim();
    if normalized.is_empty() {
        DEFAULT_MODEL.to_string()
    } else {
        normalized.to_string()
    }
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> AppResult<String> {
    field.text().await.map_err(|e| AppError::Request(format!("malformed text field: {e}")))
}
