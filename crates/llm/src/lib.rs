//! LLM integration crate for the Ordinance agent.
//!
//! This crate provides a provider-agnostic abstraction for interacting with
//! Large Language Models and embedding models. The pipeline phases depend
//! only on the [`LlmClient`] and [`EmbeddingClient`] traits; concrete
//! providers are selected by the factory at startup.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default), completions and embeddings
//! - **Mock**: Scripted responses for tests
//!
//! # Example
//! ```no_run
//! use ordinance_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Hello, world!", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod embeddings;
pub mod factory;
pub mod providers;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
pub use embeddings::EmbeddingClient;
pub use factory::{create_client, create_embedding_client};
pub use providers::{MockLlmClient, OllamaClient};
