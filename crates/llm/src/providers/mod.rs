//! LLM provider implementations.

pub mod mock;
pub mod ollama;

pub use mock::{MockEmbeddingClient, MockLlmClient};
pub use ollama::OllamaClient;
