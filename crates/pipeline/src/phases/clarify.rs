//! Clarification phase.
//!
//! Extracts a structured query from free text plus conversation history.
//! When the model flags missing information the clarifying questions are
//! surfaced through logs and the query context; the pipeline never blocks
//! on an interactive round-trip. Clarification failure is never fatal; the
//! phase falls back to the raw query.

use crate::phases::parse_json_reply;
use crate::types::{ClarifiedQuery, Message, PhaseError, PipelinePhase, Role};
use ordinance_llm::{LlmClient, LlmRequest};
use ordinance_prompt::{PromptRegistry, CLARIFY_PROMPT};
use serde::Deserialize;
use std::sync::Arc;

/// Parsed model output for the clarification instruction.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ClarifyOutcome {
    needs_clarification: bool,
    clarifying_questions: Vec<String>,
    extracted_info: Option<ClarifiedQuery>,
}

/// Clarification phase executor.
#[derive(Clone)]
pub struct ClarificationPhase {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptRegistry>,
    model: String,
    temperature: f32,
    interactive: bool,
}

impl ClarificationPhase {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptRegistry>,
        model: impl Into<String>,
        temperature: f32,
        interactive: bool,
    ) -> Self {
        Self {
            llm,
            prompts,
            model: model.into(),
            temperature,
            interactive,
        }
    }

    /// Extract a structured query. Returns the clarified query and, when the
    /// extraction degraded to the raw query, the phase error to record.
    pub async fn execute(
        &self,
        query: &str,
        history: &[Message],
    ) -> (ClarifiedQuery, Option<PhaseError>) {
        tracing::info!("Clarification phase: analyzing query");

        match self.extract(query, history).await {
            Ok(clarified) => {
                tracing::info!(
                    municipality = clarified.municipality.as_deref().unwrap_or("not specified"),
                    "Query clarified"
                );
                (clarified, None)
            }
            Err(e) => {
                tracing::warn!("Clarification degraded, using raw query: {}", e);
                (
                    ClarifiedQuery::from_raw(query),
                    Some(PhaseError {
                        phase: PipelinePhase::Clarify,
                        message: format!("clarification degraded: {}", e),
                    }),
                )
            }
        }
    }

    async fn extract(
        &self,
        query: &str,
        history: &[Message],
    ) -> ordinance_core::AppResult<ClarifiedQuery> {
        let system = self.prompts.system(CLARIFY_PROMPT)?.to_string();
        let prompt = build_conversation_prompt(query, history);

        let request = LlmRequest::new(prompt, &self.model)
            .with_system(system)
            .with_temperature(self.temperature);

        let response = self.llm.complete(&request).await?;
        let outcome: ClarifyOutcome = parse_json_reply(&response.content)?;

        let mut clarified = outcome.extracted_info.ok_or_else(|| {
            ordinance_core::AppError::Serialization(
                "Model output carried no extractedInfo".to_string(),
            )
        })?;

        // The question field must never be empty downstream
        if clarified.question.trim().is_empty() {
            clarified.question = query.to_string();
        }

        if outcome.needs_clarification && self.interactive {
            for question in &outcome.clarifying_questions {
                tracing::info!("Clarifying question: {}", question);
            }

            clarified.context.insert(
                "clarifyingQuestions".to_string(),
                serde_json::json!(outcome.clarifying_questions),
            );
        }

        Ok(clarified)
    }
}

/// Flatten the conversation history and the latest query into one prompt.
fn build_conversation_prompt(query: &str, history: &[Message]) -> String {
    let mut prompt = String::new();

    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for message in history {
            let speaker = match message.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{}: {}\n", speaker, message.content));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("Latest question: {}", query));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordinance_llm::MockLlmClient;

    fn phase(mock: Arc<MockLlmClient>) -> ClarificationPhase {
        ClarificationPhase::new(
            mock,
            Arc::new(PromptRegistry::builtin()),
            "test-model",
            0.3,
            true,
        )
    }

    #[tokio::test]
    async fn test_extracts_structured_query() {
        let mock = Arc::new(MockLlmClient::with_replies(vec![
            r#"{
                "needsClarification": false,
                "clarifyingQuestions": [],
                "extractedInfo": {
                    "question": "What are the setback requirements",
                    "municipality": "Houston",
                    "address": "123 Main St, Houston",
                    "specificCodes": ["setback requirements"]
                }
            }"#,
        ]));

        let (clarified, degradation) = phase(mock.clone())
            .execute("What are the setback requirements for 123 Main St, Houston?", &[])
            .await;

        assert!(degradation.is_none());
        assert_eq!(clarified.municipality.as_deref(), Some("Houston"));
        assert_eq!(clarified.specific_codes, vec!["setback requirements"]);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_output_falls_back_to_raw_query() {
        let mock = Arc::new(MockLlmClient::with_replies(vec!["I cannot answer that."]));

        let (clarified, degradation) = phase(mock).execute("What is the setback?", &[]).await;

        assert_eq!(clarified.question, "What is the setback?");
        assert_eq!(
            clarified.context.get("rawQuery"),
            Some(&serde_json::Value::String("What is the setback?".to_string()))
        );
        let degradation = degradation.unwrap();
        assert_eq!(degradation.phase, PipelinePhase::Clarify);
    }

    #[tokio::test]
    async fn test_llm_failure_falls_back_to_raw_query() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_failure("backend down");

        let (clarified, degradation) = phase(mock).execute("height limits?", &[]).await;

        assert_eq!(clarified.question, "height limits?");
        assert!(degradation.is_some());
    }

    #[tokio::test]
    async fn test_clarifying_questions_surface_in_context() {
        let mock = Arc::new(MockLlmClient::with_replies(vec![
            r#"{
                "needsClarification": true,
                "clarifyingQuestions": ["Which city or municipality are you asking about?"],
                "extractedInfo": {"question": "What are the setback requirements"}
            }"#,
        ]));

        let (clarified, degradation) = phase(mock).execute("What are the setback requirements?", &[]).await;

        assert!(degradation.is_none());
        let questions = clarified.context.get("clarifyingQuestions").unwrap();
        assert_eq!(questions.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_extracted_question_is_backfilled() {
        let mock = Arc::new(MockLlmClient::with_replies(vec![
            r#"{"extractedInfo": {"question": "", "municipality": "Austin"}}"#,
        ]));

        let (clarified, _) = phase(mock).execute("lot coverage in Austin", &[]).await;
        assert_eq!(clarified.question, "lot coverage in Austin");
        assert_eq!(clarified.municipality.as_deref(), Some("Austin"));
    }

    #[test]
    fn test_conversation_prompt_includes_history() {
        let history = vec![
            Message::user("What about Houston?"),
            Message::assistant("Houston follows Chapter 42."),
        ];

        let prompt = build_conversation_prompt("And the lot size?", &history);
        assert!(prompt.contains("User: What about Houston?"));
        assert!(prompt.contains("Assistant: Houston follows Chapter 42."));
        assert!(prompt.ends_with("Latest question: And the lot size?"));
    }
}
