use async_trait::async_trait;
use harbor_core::Result;
use serde::{Deserialize, Serialize};

/// A request to the generation service. The caller has already folded the
/// context bundle and directive into `system`/`prompt` — providers see
/// plain text, never Harbor's internal types.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// System guidance (tone directive, assembled memory context).
    pub system: Option<String>,
    /// The user-facing message to respond to.
    pub prompt: String,
    /// Provider-specific model identifier. None = provider default.
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            model: None,
            max_tokens: 1024,
            temperature: 0.7,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// A complete response from the generation service.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub usage: Usage,
}

/// A chunk of an incrementally-delivered response.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    TextDelta(String),
    Done,
    Error(String),
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Trait implemented by each generation backend.
///
/// Streaming is a delivery optimization, not a correctness requirement:
/// the default `stream` buffers a full `generate` call and emits it as a
/// single delta, so backends only override it when they can do better.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Human-readable name, e.g. "openai-compat", "mock".
    fn name(&self) -> &str;

    /// Produce a complete response.
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse>;

    /// Produce a response incrementally.
    async fn stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<StreamChunk>> {
        let response = self.generate(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(2);
        let _ = tx.send(StreamChunk::TextDelta(response.text)).await;
        let _ = tx.send(StreamChunk::Done).await;
        Ok(rx)
    }
}
