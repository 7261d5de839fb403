//! Scripted mock providers for tests.
//!
//! The mock LLM client replays a queue of scripted replies and records every
//! request it receives, so tests can assert on call counts and prompt
//! contents. The mock embedding client produces deterministic vectors from
//! the input text.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use crate::embeddings::EmbeddingClient;
use ordinance_core::{AppError, AppResult};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A scripted reply for the mock LLM client.
#[derive(Debug, Clone)]
enum ScriptedReply {
    Text(String),
    Failure(String),
}

/// Mock LLM client that replays scripted replies.
///
/// When the script runs out, the default reply is returned. Requests are
/// recorded in arrival order.
pub struct MockLlmClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<LlmRequest>>,
    default_reply: String,
}

impl MockLlmClient {
    /// Create a mock with an empty script and a default reply.
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            default_reply: "mock response".to_string(),
        }
    }

    /// Create a mock preloaded with text replies, consumed in order.
    pub fn with_replies(replies: Vec<&str>) -> Self {
        let mock = Self::new();
        for reply in replies {
            mock.push_reply(reply);
        }
        mock
    }

    /// Set the reply used when the script is exhausted.
    pub fn with_default_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    /// Queue a successful text reply.
    pub fn push_reply(&self, text: impl Into<String>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(ScriptedReply::Text(text.into()));
    }

    /// Queue a failure.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(ScriptedReply::Failure(message.into()));
    }

    /// Number of requests received so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Copies of all recorded requests.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_reply(&self, request: &LlmRequest) -> AppResult<String> {
        self.requests.lock().unwrap().push(request.clone());

        match self.replies.lock().unwrap().pop_front() {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Failure(message)) => Err(AppError::Llm(message)),
            None => Ok(self.default_reply.clone()),
        }
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LlmClient for MockLlmClient {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let content = self.next_reply(request)?;

        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::default(),
            done: true,
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        let content = self.next_reply(request)?;
        let model = request.model.clone();

        let words: Vec<String> = content
            .split_whitespace()
            .map(|w| format!("{} ", w))
            .collect();
        let count = words.len();

        let chunks: Vec<AppResult<LlmStreamChunk>> = words
            .into_iter()
            .enumerate()
            .map(|(i, word)| {
                Ok(LlmStreamChunk {
                    content: word,
                    model: model.clone(),
                    done: i + 1 == count,
                    usage: None,
                })
            })
            .collect();

        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// Mock embedding client producing deterministic vectors.
pub struct MockEmbeddingClient {
    dimensions: usize,
}

impl MockEmbeddingClient {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait::async_trait]
impl EmbeddingClient for MockEmbeddingClient {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                // Simple byte-mixing hash spread over the vector, normalized
                let mut vector = vec![0.0f32; self.dimensions];
                for (i, byte) in text.bytes().enumerate() {
                    vector[i % self.dimensions] += byte as f32 / 255.0;
                }
                let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for v in &mut vector {
                        *v /= norm;
                    }
                }
                vector
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_scripted_replies_in_order() {
        let mock = MockLlmClient::with_replies(vec!["first", "second"]);
        let request = LlmRequest::new("q", "m");

        assert_eq!(mock.complete(&request).await.unwrap().content, "first");
        assert_eq!(mock.complete(&request).await.unwrap().content, "second");
        // Script exhausted, default reply
        assert_eq!(
            mock.complete(&request).await.unwrap().content,
            "mock response"
        );
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let mock = MockLlmClient::new();
        mock.push_failure("backend down");

        let request = LlmRequest::new("q", "m");
        let result = mock.complete(&request).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_requests_are_recorded() {
        let mock = MockLlmClient::new();
        let request = LlmRequest::new("what is the setback", "m").with_system("sys");
        mock.complete(&request).await.unwrap();

        let recorded = mock.requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].prompt, "what is the setback");
        assert_eq!(recorded[0].system.as_deref(), Some("sys"));
    }

    #[tokio::test]
    async fn test_stream_reassembles_to_content() {
        let mock = MockLlmClient::with_replies(vec!["hello streaming world"]);
        let request = LlmRequest::new("q", "m");

        let mut stream = mock.stream(&request).await.unwrap();
        let mut collected = String::new();
        while let Some(chunk) = stream.next().await {
            collected.push_str(&chunk.unwrap().content);
        }

        assert_eq!(collected.trim_end(), "hello streaming world");
    }

    #[tokio::test]
    async fn test_mock_embeddings_deterministic() {
        let mock = MockEmbeddingClient::new(16);
        let a = mock.embed("minimum lot size").await.unwrap();
        let b = mock.embed("minimum lot size").await.unwrap();
        let c = mock.embed("maximum height").await.unwrap();

        assert_eq!(a.len(), 16);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
