//! Agent entry point.
//!
//! Thin wrapper around the pipeline: validates the conversation, runs the
//! pipeline, and converts fatal errors into safe user-facing messages. The
//! agent never surfaces raw internal error text to callers.

use crate::index::DocumentIndex;
use crate::locator::SourceLocator;
use crate::pipeline::{AnswerStream, Pipeline};
use crate::types::{AgentOptions, AgentResponse, Message};
use ordinance_core::{AgentConfig, AppResult};
use ordinance_llm::{EmbeddingClient, LlmClient};
use ordinance_prompt::PromptRegistry;
use std::sync::Arc;

/// The municipal code answering agent.
pub struct Agent {
    pipeline: Pipeline,
}

impl Agent {
    /// Build an agent from configuration and injected service clients.
    ///
    /// Prompt overrides are loaded from the workspace's `.ordinance/prompts/`
    /// directory.
    pub fn new(
        config: &AgentConfig,
        llm: Arc<dyn LlmClient>,
        embeddings: Arc<dyn EmbeddingClient>,
        index: Arc<dyn DocumentIndex>,
        locator: Arc<dyn SourceLocator>,
    ) -> AppResult<Self> {
        config.validate()?;
        let prompts = Arc::new(PromptRegistry::with_overrides(&config.workspace)?);

        Ok(Self {
            pipeline: Pipeline::new(config, llm, embeddings, index, locator, prompts),
        })
    }

    /// Build an agent from an already-wired pipeline.
    pub fn from_pipeline(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// Answer the latest message in the conversation.
    ///
    /// Never returns an error: pipeline failures are converted into an
    /// apologetic response with a phase-appropriate hint.
    pub async fn invoke(&self, messages: &[Message], options: &AgentOptions) -> AgentResponse {
        let Some((latest, history)) = split_conversation(messages) else {
            return AgentResponse {
                content: ordinance_prompt::messages::NO_QUESTION.to_string(),
                sources: None,
                confidence: None,
            };
        };

        match self.pipeline.execute(history, latest, options).await {
            Ok(run) => run.response,
            Err(error) => {
                tracing::error!(phase = %error.phase, "Agent error: {}", error);
                AgentResponse {
                    content: error.user_message().to_string(),
                    sources: None,
                    confidence: None,
                }
            }
        }
    }

    /// Stream the answer to the latest message in the conversation.
    pub async fn stream(&self, messages: &[Message], options: &AgentOptions) -> AnswerStream {
        let Some((latest, history)) = split_conversation(messages) else {
            let chunk = ordinance_prompt::messages::NO_QUESTION.to_string();
            return Box::pin(futures::stream::once(async move { chunk }));
        };

        self.pipeline.stream(history, latest, options).await
    }
}

/// Split the conversation into the latest query and the preceding history.
/// Returns `None` when there is no usable question.
fn split_conversation(messages: &[Message]) -> Option<(&str, &[Message])> {
    let (latest, history) = messages.split_last()?;

    if latest.content.trim().is_empty() {
        return None;
    }

    Some((latest.content.as_str(), history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexHit, MockIndex};
    use crate::locator::MockLocator;
    use futures::StreamExt;
    use ordinance_llm::providers::MockEmbeddingClient;
    use ordinance_llm::MockLlmClient;

    fn agent(llm: Arc<MockLlmClient>, index: Arc<MockIndex>) -> Agent {
        let pipeline = Pipeline::new(
            &AgentConfig::default(),
            llm,
            Arc::new(MockEmbeddingClient::new(16)),
            index,
            Arc::new(MockLocator::new()),
            Arc::new(PromptRegistry::builtin()),
        );
        Agent::from_pipeline(pipeline)
    }

    fn seeded_index() -> Arc<MockIndex> {
        let index = Arc::new(MockIndex::new());
        index.add_hit(
            "building-codes-general",
            IndexHit {
                id: "doc-001".to_string(),
                content: "Minimum lot size is 1,400 square feet.".to_string(),
                metadata: serde_json::json!({
                    "municipality": "Houston",
                    "chapter": "42",
                    "section": "1.2",
                    "title": "Minimum Lot Size Requirements"
                }),
                score: 0.95,
            },
        );
        index
    }

    #[tokio::test]
    async fn test_empty_conversation_asks_for_a_question() {
        let response = agent(Arc::new(MockLlmClient::new()), Arc::new(MockIndex::new()))
            .invoke(&[], &AgentOptions::default())
            .await;

        assert!(response.content.contains("Please provide a question"));
        assert!(response.sources.is_none());
    }

    #[tokio::test]
    async fn test_blank_latest_message_asks_for_a_question() {
        let messages = vec![Message::user("   ")];
        let response = agent(Arc::new(MockLlmClient::new()), Arc::new(MockIndex::new()))
            .invoke(&messages, &AgentOptions::default())
            .await;

        assert!(response.content.contains("Please provide a question"));
    }

    #[tokio::test]
    async fn test_invoke_returns_answer_with_sources() {
        let llm = Arc::new(MockLlmClient::with_replies(vec![
            r#"{"extractedInfo": {"question": "minimum lot size", "municipality": "Houston"}}"#,
            "The minimum lot size is 1,400 square feet [Houston Ch. 42 Sec. 1.2].",
        ]));

        let messages = vec![Message::user("What is the minimum lot size in Houston?")];
        let response = agent(llm, seeded_index())
            .invoke(&messages, &AgentOptions::default())
            .await;

        assert!(response.content.contains("1,400 square feet"));
        assert_eq!(response.sources.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invoke_hides_internal_errors() {
        let index = Arc::new(MockIndex::new());
        index.fail_namespace("building-codes-general");

        let messages = vec![Message::user("lot size?")];
        let response = agent(Arc::new(MockLlmClient::new()), index)
            .invoke(&messages, &AgentOptions::default())
            .await;

        assert!(response.content.contains("unavailable"));
        assert!(!response.content.contains("mock failure"));
        assert!(response.sources.is_none());
    }

    #[tokio::test]
    async fn test_stream_empty_conversation() {
        let mut stream = agent(Arc::new(MockLlmClient::new()), Arc::new(MockIndex::new()))
            .stream(&[], &AgentOptions::default())
            .await;

        let chunk = stream.next().await.unwrap();
        assert!(chunk.contains("Please provide a question"));
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_split_conversation() {
        let messages = vec![
            Message::user("first"),
            Message::assistant("answer"),
            Message::user("second"),
        ];

        let (latest, history) = split_conversation(&messages).unwrap();
        assert_eq!(latest, "second");
        assert_eq!(history.len(), 2);
    }
}
