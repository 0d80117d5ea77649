use async_trait::async_trait;
use harbor_core::{HarborError, Result};
use tracing::debug;

use crate::provider::*;

/// OpenAI-compatible chat completion client (works with OpenAI, Azure,
/// Together, vLLM, etc.)
pub struct OpenAiCompatGeneration {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl OpenAiCompatGeneration {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.openai.com/v1".into(),
            default_model: "gpt-4o-mini".into(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }
}

#[async_trait]
impl GenerationProvider for OpenAiCompatGeneration {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);

        let mut messages = Vec::new();
        if let Some(ref system) = request.system {
            messages.push(serde_json::json!({
                "role": "system",
                "content": system,
            }));
        }
        messages.push(serde_json::json!({
            "role": "user",
            "content": request.prompt,
        }));

        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        debug!(model, "sending generation request");

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| HarborError::Provider(format!("generation request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(HarborError::Provider(format!(
                "generation HTTP {status}: {text}"
            )));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| HarborError::Provider(format!("generation parse error: {e}")))?;

        let text = data["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        if text.is_empty() {
            return Err(HarborError::Provider("empty generation response".into()));
        }

        let usage = Usage {
            input_tokens: data["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: data["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        };

        Ok(GenerationResponse { text, usage })
    }
}
