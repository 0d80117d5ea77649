//! Mock providers for deterministic testing.
//!
//! Return pre-configured responses without making any HTTP calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::embedding::EmbeddingProvider;
use crate::provider::*;
use harbor_core::{HarborError, Result};

/// A mock generation provider with a scripted response queue.
///
/// Responses are consumed front-to-back; when the queue is empty the last
/// configured response repeats. `fail_times` injects transient failures
/// before the first success, which is how retry paths are exercised.
pub struct MockGeneration {
    responses: Mutex<Vec<String>>,
    fail_times: Mutex<u32>,
    delay: Option<Duration>,
    /// All requests received, for assertions in tests.
    pub requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl Default for MockGeneration {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGeneration {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            fail_times: Mutex::new(0),
            delay: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_response(self, text: &str) -> Self {
        self.responses.lock().push(text.to_string());
        self
    }

    /// Replace the whole script.
    pub fn with_responses(self, texts: &[&str]) -> Self {
        *self.responses.lock() = texts.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Fail the next `n` calls with a transient provider error.
    pub fn failing(self, n: u32) -> Self {
        *self.fail_times.lock() = n;
        self
    }

    /// Sleep this long before answering — lets tests hold a turn open.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl GenerationProvider for MockGeneration {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.requests.lock().push(request.clone());

        {
            let mut fails = self.fail_times.lock();
            if *fails > 0 {
                *fails -= 1;
                return Err(HarborError::Provider("injected mock failure".into()));
            }
        }

        let text = {
            let mut responses = self.responses.lock();
            if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "mock response".to_string())
            }
        };

        Ok(GenerationResponse {
            text,
            usage: Usage {
                input_tokens: 100,
                output_tokens: 50,
            },
        })
    }
}

/// A mock embedding provider producing deterministic vectors.
///
/// The embedding for a text is a bag-of-characters histogram, so texts
/// sharing words land close in cosine space. `unavailable` makes every
/// call fail with `EmbeddingUnavailable`, for degradation tests.
pub struct MockEmbedding {
    dims: usize,
    unavailable: Mutex<bool>,
    pub call_count: Mutex<usize>,
}

impl Default for MockEmbedding {
    fn default() -> Self {
        Self::new(32)
    }
}

impl MockEmbedding {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            unavailable: Mutex::new(false),
            call_count: Mutex::new(0),
        }
    }

    pub fn unavailable(self) -> Self {
        *self.unavailable.lock() = true;
        self
    }

    pub fn set_unavailable(&self, down: bool) {
        *self.unavailable.lock() = down;
    }

    /// Deterministic embedding for a text, usable directly in test fixtures.
    pub fn embedding_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for (i, word) in text.to_lowercase().split_whitespace().enumerate() {
            let mut h: usize = i % 7;
            for b in word.bytes() {
                h = h.wrapping_mul(31).wrapping_add(b as usize);
            }
            v[h % self.dims] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedding {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        *self.call_count.lock() += 1;
        if *self.unavailable.lock() {
            return Err(HarborError::EmbeddingUnavailable(
                "mock embedding service down".into(),
            ));
        }
        Ok(texts.iter().map(|t| self.embedding_for(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn name(&self) -> &str {
        "mock"
    }
}
