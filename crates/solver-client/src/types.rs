use std::time::Duration;

/// One image attached to a solve request.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// A solve request template: reused unchanged across every rotation
/// attempt, only the attempt's key differs.
#[derive(Debug, Clone, Default)]
pub struct SolveRequest {
    pub prompt: Option<String>,
    pub images: Vec<ImageUpload>,
    pub model: Option<String>,
}

impl SolveRequest {
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self { prompt: Some(prompt.into()), ..Default::default() }
    }

    pub fn with_image(mut self, image: ImageUpload) -> Self {
        self.images.push(image);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// A request must carry a question in some form before it is sent.
    pub fn is_empty(&self) -> bool {
        self.prompt.as_deref().map(str::trim).unwrap_or_default().is_empty()
            && self.images.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Bearer key presented to the relay boundary (not an upstream key).
    pub caller_key: Option<String>,
    /// Connect-phase timeout. No overall request timeout is set: streamed
    /// answers legitimately take as long as the model generates.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8065".to_string(),
            caller_key: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}
