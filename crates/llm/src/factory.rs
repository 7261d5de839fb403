//! LLM provider factory.
//!
//! Creates completion and embedding clients from the provider name and
//! endpoint configuration resolved at startup.

use crate::client::LlmClient;
use crate::embeddings::EmbeddingClient;
use crate::providers::{MockLlmClient, OllamaClient};
use std::sync::Arc;

/// Create a completion client for the given provider.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama", "mock")
/// * `endpoint` - Optional custom endpoint URL
pub fn create_client(provider: &str, endpoint: Option<&str>) -> Result<Arc<dyn LlmClient>, String> {
    match provider.to_lowercase().as_str() {
        "ollama" => {
            let base_url = endpoint.unwrap_or("http://localhost:11434");
            Ok(Arc::new(OllamaClient::with_base_url(base_url)))
        }
        "mock" => Ok(Arc::new(MockLlmClient::new())),
        _ => Err(format!("Unknown provider: {}", provider)),
    }
}

/// Create an embedding client for the given provider.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama")
/// * `endpoint` - Optional custom endpoint URL
/// * `model` - Embedding model identifier
/// * `dimensions` - Expected embedding dimensions
pub fn create_embedding_client(
    provider: &str,
    endpoint: Option<&str>,
    model: &str,
    dimensions: usize,
) -> Result<Arc<dyn EmbeddingClient>, String> {
    match provider.to_lowercase().as_str() {
        "ollama" => {
            let base_url = endpoint.unwrap_or("http://localhost:11434");
            let client =
                OllamaClient::with_base_url(base_url).with_embedding_model(model, dimensions);
            Ok(Arc::new(client))
        }
        "mock" => Ok(Arc::new(crate::providers::mock::MockEmbeddingClient::new(
            dimensions,
        ))),
        _ => Err(format!("Unknown embedding provider: {}", provider)),
    }
}
