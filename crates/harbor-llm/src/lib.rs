//! # harbor-llm
//!
//! Client abstractions for the external services Harbor consumes: text
//! generation and embedding. Both are opaque remote collaborators — this
//! crate defines the traits, an OpenAI-compatible HTTP adapter for each,
//! and deterministic mocks for tests.

pub mod embedding;
pub mod mock;
pub mod openai;
pub mod provider;

pub use embedding::{EmbeddingProvider, OpenAiCompatEmbedding};
pub use mock::{MockEmbedding, MockGeneration};
pub use openai::OpenAiCompatGeneration;
pub use provider::{GenerationProvider, GenerationRequest, GenerationResponse, StreamChunk};
