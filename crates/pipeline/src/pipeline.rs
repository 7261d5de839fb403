//! Pipeline orchestrator.
//!
//! Drives the four phases in strict order, owns the shared pipeline state,
//! records per-phase wall-clock timings and errors, and exposes blocking and
//! streaming invocation modes. Streaming re-emits the completed answer; it
//! is an emission strategy, not a separate computation path, so streamed
//! output can never diverge from the blocking result.

use crate::error::PipelineError;
use crate::index::DocumentIndex;
use crate::locator::SourceLocator;
use crate::phases::{ClarificationPhase, RetrievalPhase, SynthesisPhase, VerificationPhase};
use crate::types::{
    AgentOptions, AgentResponse, ClarifiedQuery, Message, PhaseError, PipelinePhase, PipelineState,
};
use futures::{Stream, StreamExt};
use ordinance_core::config::{AgentConfig, TimeoutConfig};
use ordinance_llm::{EmbeddingClient, LlmClient};
use ordinance_prompt::PromptRegistry;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Delay between emitted chunks in streaming mode.
const STREAM_CHUNK_DELAY: Duration = Duration::from_millis(20);

/// Stream of answer text chunks.
pub type AnswerStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// A completed pipeline invocation: the caller-facing response plus the
/// full internal state for logging and inspection.
#[derive(Debug)]
pub struct PipelineRun {
    pub response: AgentResponse,
    pub state: PipelineState,
}

/// The four-phase answering pipeline.
pub struct Pipeline {
    clarify: ClarificationPhase,
    retrieve: RetrievalPhase,
    verify: VerificationPhase,
    synthesize: SynthesisPhase,
    timeouts: TimeoutConfig,
    default_max_sources: usize,
}

impl Pipeline {
    /// Wire the phases from configuration and injected clients.
    pub fn new(
        config: &AgentConfig,
        llm: Arc<dyn LlmClient>,
        embeddings: Arc<dyn EmbeddingClient>,
        index: Arc<dyn DocumentIndex>,
        locator: Arc<dyn SourceLocator>,
        prompts: Arc<PromptRegistry>,
    ) -> Self {
        let clarify = ClarificationPhase::new(
            llm.clone(),
            prompts.clone(),
            &config.models.planner,
            config.models.planner_temperature,
            config.features.interactive_clarification,
        );

        let retrieve = RetrievalPhase::new(
            index,
            embeddings,
            config.retrieval.clone(),
            config.features.search_user_documents,
            config.response.max_sources,
        );

        let verify = VerificationPhase::new(
            llm.clone(),
            locator,
            prompts.clone(),
            &config.models.verifier,
            config.models.verifier_temperature,
            config.verification.clone(),
        );

        let synthesize = SynthesisPhase::new(
            llm,
            prompts,
            &config.models.synthesizer,
            config.models.synthesizer_temperature,
            config.response.excerpt_length,
        );

        Self {
            clarify,
            retrieve,
            verify,
            synthesize,
            timeouts: config.timeouts.clone(),
            default_max_sources: config.response.max_sources,
        }
    }

    /// Execute the full pipeline for one query.
    pub async fn execute(
        &self,
        history: &[Message],
        latest_query: &str,
        options: &AgentOptions,
    ) -> Result<PipelineRun, PipelineError> {
        let mut state = PipelineState::new(latest_query);
        tracing::info!("Starting answering pipeline");

        // Phase 1: Clarification
        if options.skip_clarification {
            // Raw query with no extracted fields
            state.clarified_query = ClarifiedQuery {
                question: latest_query.to_string(),
                ..Default::default()
            };
            state
                .metadata
                .phase_timings
                .insert(PipelinePhase::Clarify, Duration::ZERO);
        } else {
            let started = Instant::now();
            let result = timeout(
                self.timeouts.clarify(),
                self.clarify.execute(latest_query, history),
            )
            .await;
            state
                .metadata
                .phase_timings
                .insert(PipelinePhase::Clarify, started.elapsed());

            match result {
                Ok((clarified, degradation)) => {
                    state.clarified_query = clarified;
                    state.metadata.errors.extend(degradation);
                }
                Err(_) => return Err(self.fail(&mut state, PipelinePhase::Clarify)),
            }
        }

        // Phase 2: Retrieval
        let started = Instant::now();
        let result = timeout(
            self.timeouts.retrieve(),
            self.retrieve.execute(&state.clarified_query),
        )
        .await;
        state
            .metadata
            .phase_timings
            .insert(PipelinePhase::Retrieve, started.elapsed());

        match result {
            Ok(Ok((documents, degradations))) => {
                state.retrieved_documents = documents;
                state.metadata.errors.extend(degradations);
            }
            Ok(Err(error)) => return Err(self.abort(&mut state, error)),
            Err(_) => return Err(self.fail(&mut state, PipelinePhase::Retrieve)),
        }

        // Phase 3: Verification
        let started = Instant::now();
        let result = timeout(
            self.timeouts.verify(),
            self.verify.execute(&state.retrieved_documents),
        )
        .await;
        state
            .metadata
            .phase_timings
            .insert(PipelinePhase::Verify, started.elapsed());

        match result {
            Ok((citations, degradations)) => {
                state.verified_citations = citations;
                state.metadata.errors.extend(degradations);
            }
            Err(_) => return Err(self.fail(&mut state, PipelinePhase::Verify)),
        }

        // Phase 4: Synthesis
        let max_sources = options.max_sources.unwrap_or(self.default_max_sources);
        let started = Instant::now();
        let result = timeout(
            self.timeouts.synthesize(),
            self.synthesize
                .execute(&state.clarified_query, &state.verified_citations, max_sources),
        )
        .await;
        state
            .metadata
            .phase_timings
            .insert(PipelinePhase::Synthesize, started.elapsed());

        let synthesized = match result {
            Ok(Ok(synthesized)) => synthesized,
            Ok(Err(error)) => return Err(self.abort(&mut state, error)),
            Err(_) => return Err(self.fail(&mut state, PipelinePhase::Synthesize)),
        };

        let response = AgentResponse {
            content: synthesized.content.clone(),
            sources: Some(synthesized.sources.clone()),
            confidence: options.include_confidence.then_some(synthesized.confidence),
        };
        state.synthesized_response = Some(synthesized);

        tracing::info!(
            elapsed_ms = (chrono::Utc::now() - state.metadata.start_time).num_milliseconds(),
            errors = state.metadata.errors.len(),
            "Pipeline completed"
        );

        Ok(PipelineRun { response, state })
    }

    /// Execute the pipeline and re-emit the answer incrementally: word-level
    /// content chunks, then a deterministic sources section and, when
    /// requested, a confidence line. Errors yield a trailing notice instead
    /// of silently truncating.
    pub async fn stream(
        &self,
        history: &[Message],
        latest_query: &str,
        options: &AgentOptions,
    ) -> AnswerStream {
        let chunks = match self.execute(history, latest_query, options).await {
            Ok(run) => build_stream_chunks(&run.response),
            Err(error) => {
                tracing::error!("Pipeline error while streaming: {}", error);
                vec![format!(
                    "{}{}",
                    error.user_message(),
                    ordinance_prompt::messages::STREAM_ERROR_NOTICE
                )]
            }
        };

        Box::pin(futures::stream::iter(chunks).then(|chunk| async move {
            tokio::time::sleep(STREAM_CHUNK_DELAY).await;
            chunk
        }))
    }

    /// Record a timeout for `phase` and build the fatal error.
    fn fail(&self, state: &mut PipelineState, phase: PipelinePhase) -> PipelineError {
        self.abort(state, PipelineError::timeout(phase))
    }

    /// Record a fatal error into the state before surfacing it.
    fn abort(&self, state: &mut PipelineState, error: PipelineError) -> PipelineError {
        tracing::error!(phase = %error.phase, "Pipeline aborted: {}", error);
        state.metadata.errors.push(PhaseError {
            phase: error.phase,
            message: error.message.clone(),
        });
        error
    }
}

/// Chunk a completed response for streaming emission.
fn build_stream_chunks(response: &AgentResponse) -> Vec<String> {
    let mut chunks: Vec<String> = response
        .content
        .split_whitespace()
        .map(|word| format!("{} ", word))
        .collect();

    if let Some(ref sources) = response.sources {
        if !sources.is_empty() {
            chunks.push("\n\n---\n\n**Sources:**\n".to_string());
            for source in sources {
                let mut line = format!("- {}", source.citation);
                if let Some(page) = source.page {
                    line.push_str(&format!(" (Page {})", page));
                }
                line.push('\n');
                chunks.push(line);
            }
        }
    }

    if let Some(confidence) = response.confidence {
        chunks.push(format!("\n**Confidence:** {:.0}%\n", confidence * 100.0));
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::index::{IndexHit, MockIndex};
    use crate::locator::mock::{candidate, MockLocator};
    use crate::types::Source;
    use ordinance_core::AppResult;
    use ordinance_llm::providers::MockEmbeddingClient;
    use ordinance_llm::{LlmRequest, LlmResponse, LlmStream, MockLlmClient};

    const CLARIFY_REPLY: &str = r#"{
        "needsClarification": false,
        "clarifyingQuestions": [],
        "extractedInfo": {
            "question": "What is the minimum lot size",
            "municipality": "Houston",
            "propertyType": "residential"
        }
    }"#;

    const SEMANTIC_REPLY: &str =
        r#"{"match": true, "confidence": 0.95, "explanation": "same requirement"}"#;

    const SYNTHESIS_REPLY: &str =
        "The minimum lot size in Houston urban areas is 1,400 square feet [Houston Ch. 42 Sec. 1.2].";

    fn seeded_index() -> Arc<MockIndex> {
        let index = Arc::new(MockIndex::new());
        index.add_hit(
            "building-codes-general",
            IndexHit {
                id: "doc-001".to_string(),
                content: "Minimum lot size in urban areas is 1,400 square feet.".to_string(),
                metadata: serde_json::json!({
                    "municipality": "Houston",
                    "state": "TX",
                    "chapter": "42",
                    "section": "1.2",
                    "subsection": "a",
                    "title": "Minimum Lot Size Requirements",
                    "sourceUrl": "s3://codes/houston/ch42.pdf",
                    "pageRange": {"start": 15, "end": 16}
                }),
                score: 0.95,
            },
        );
        index
    }

    fn pipeline(llm: Arc<MockLlmClient>, index: Arc<MockIndex>) -> Pipeline {
        let locator = Arc::new(MockLocator::new().with_candidates(vec![candidate(
            15,
            "Minimum lot size in urban areas is 1,400 square feet",
            0.95,
        )]));

        Pipeline::new(
            &AgentConfig::default(),
            llm,
            Arc::new(MockEmbeddingClient::new(16)),
            index,
            locator,
            Arc::new(PromptRegistry::builtin()),
        )
    }

    #[tokio::test]
    async fn test_full_pipeline_happy_path() {
        let llm = Arc::new(MockLlmClient::with_replies(vec![
            CLARIFY_REPLY,
            SEMANTIC_REPLY,
            SYNTHESIS_REPLY,
        ]));

        let options = AgentOptions {
            include_confidence: true,
            ..Default::default()
        };

        let run = pipeline(llm, seeded_index())
            .execute(&[], "What is the minimum lot size in Houston?", &options)
            .await
            .unwrap();

        assert!(run.response.content.contains("1,400 square feet"));

        let sources = run.response.sources.as_ref().unwrap();
        assert_eq!(sources.len(), 1);
        assert!(sources[0].citation.contains("Houston Ch. 42"));

        // score 0.95 × (similarity 0.95 × semantic 0.95) ≈ 0.857
        let confidence = run.response.confidence.unwrap();
        assert!((confidence - 0.95 * 0.95 * 0.95).abs() < 1e-9);

        // One timing entry per phase
        assert_eq!(run.state.metadata.phase_timings.len(), 4);
        assert!(run.state.metadata.errors.is_empty());
        assert_eq!(run.state.verified_citations.len(), 1);
        assert!(run.state.verified_citations[0].is_valid);
    }

    #[tokio::test]
    async fn test_skip_clarification_uses_raw_query() {
        let llm = Arc::new(MockLlmClient::with_replies(vec![
            SEMANTIC_REPLY,
            SYNTHESIS_REPLY,
        ]));

        let options = AgentOptions {
            skip_clarification: true,
            ..Default::default()
        };

        let run = pipeline(llm.clone(), seeded_index())
            .execute(&[], "minimum lot size Houston", &options)
            .await
            .unwrap();

        assert_eq!(run.state.clarified_query.question, "minimum lot size Houston");
        assert!(run.state.clarified_query.municipality.is_none());
        assert_eq!(
            run.state.metadata.phase_timings[&PipelinePhase::Clarify],
            Duration::ZERO
        );

        // First LLM call is the semantic check, not clarification
        let first = &llm.requests()[0];
        assert!(first.system.as_ref().unwrap().contains("verification assistant"));
    }

    #[tokio::test]
    async fn test_confidence_omitted_unless_requested() {
        let llm = Arc::new(MockLlmClient::with_replies(vec![
            CLARIFY_REPLY,
            SEMANTIC_REPLY,
            SYNTHESIS_REPLY,
        ]));

        let run = pipeline(llm, seeded_index())
            .execute(&[], "lot size?", &AgentOptions::default())
            .await
            .unwrap();

        assert!(run.response.confidence.is_none());
        assert!(run.response.sources.is_some());
    }

    #[tokio::test]
    async fn test_general_namespace_failure_aborts() {
        let llm = Arc::new(MockLlmClient::with_replies(vec![CLARIFY_REPLY]));
        let index = Arc::new(MockIndex::new());
        index.fail_namespace("building-codes-general");

        let error = pipeline(llm, index)
            .execute(&[], "lot size?", &AgentOptions::default())
            .await
            .unwrap_err();

        assert_eq!(error.kind, ErrorKind::RetrievalFailed);
        assert_eq!(error.phase, PipelinePhase::Retrieve);
    }

    #[tokio::test]
    async fn test_clarify_timeout_is_fatal() {
        /// Wrapper that stalls before delegating, to trip the phase deadline.
        struct SlowLlm(MockLlmClient);

        #[async_trait::async_trait]
        impl ordinance_llm::LlmClient for SlowLlm {
            fn provider_name(&self) -> &str {
                "slow"
            }

            async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
                tokio::time::sleep(Duration::from_millis(200)).await;
                self.0.complete(request).await
            }

            async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
                self.0.stream(request).await
            }
        }

        let mut config = AgentConfig::default();
        config.timeouts.clarify_secs = 0;

        let pipeline = Pipeline::new(
            &config,
            Arc::new(SlowLlm(MockLlmClient::new())),
            Arc::new(MockEmbeddingClient::new(16)),
            Arc::new(MockIndex::new()),
            Arc::new(MockLocator::new()),
            Arc::new(PromptRegistry::builtin()),
        );

        let error = pipeline
            .execute(&[], "lot size?", &AgentOptions::default())
            .await
            .unwrap_err();

        assert_eq!(error.kind, ErrorKind::Timeout);
        assert_eq!(error.phase, PipelinePhase::Clarify);
    }

    #[tokio::test]
    async fn test_max_sources_option_caps_sources() {
        let index = seeded_index();
        // A second, weaker document without a source reference
        index.add_hit(
            "building-codes-general",
            IndexHit {
                id: "doc-002".to_string(),
                content: "Maximum building height is 35 feet.".to_string(),
                metadata: serde_json::json!({
                    "municipality": "Houston",
                    "chapter": "42",
                    "section": "2.5",
                    "title": "Height Restrictions"
                }),
                score: 0.89,
            },
        );

        let llm = Arc::new(MockLlmClient::with_replies(vec![
            CLARIFY_REPLY,
            SEMANTIC_REPLY,
            SYNTHESIS_REPLY,
        ]));

        let options = AgentOptions {
            max_sources: Some(1),
            ..Default::default()
        };

        let run = pipeline(llm, index)
            .execute(&[], "lot size?", &options)
            .await
            .unwrap();

        assert_eq!(run.response.sources.as_ref().unwrap().len(), 1);
        // Both citations were still produced internally
        assert_eq!(run.state.verified_citations.len(), 2);
    }

    #[tokio::test]
    async fn test_stream_matches_blocking_output() {
        let llm = Arc::new(MockLlmClient::with_replies(vec![
            CLARIFY_REPLY,
            SEMANTIC_REPLY,
            SYNTHESIS_REPLY,
        ]));

        let options = AgentOptions {
            include_confidence: true,
            ..Default::default()
        };

        let pipeline = pipeline(llm, seeded_index());
        let mut stream = pipeline
            .stream(&[], "What is the minimum lot size in Houston?", &options)
            .await;

        let mut streamed = String::new();
        while let Some(chunk) = stream.next().await {
            streamed.push_str(&chunk);
        }

        for word in SYNTHESIS_REPLY.split_whitespace() {
            assert!(streamed.contains(word), "missing word: {}", word);
        }
        assert!(streamed.contains("**Sources:**"));
        assert!(streamed.contains("(Page 15)"));
        assert!(streamed.contains("**Confidence:** 86%"));
    }

    #[tokio::test]
    async fn test_stream_emits_error_notice() {
        let llm = Arc::new(MockLlmClient::with_replies(vec![CLARIFY_REPLY]));
        let index = Arc::new(MockIndex::new());
        index.fail_namespace("building-codes-general");

        let mut stream = pipeline(llm, index)
            .stream(&[], "lot size?", &AgentOptions::default())
            .await;

        let mut output = String::new();
        while let Some(chunk) = stream.next().await {
            output.push_str(&chunk);
        }

        assert!(output.contains("unavailable"));
        assert!(!output.contains("mock failure"));
    }

    #[test]
    fn test_build_stream_chunks_reassembles_content() {
        let response = AgentResponse {
            content: "The minimum lot size is 1,400 square feet.".to_string(),
            sources: Some(vec![Source {
                title: "Houston Ch. 42 Sec. 1.2".to_string(),
                citation: "Houston Ch. 42 Sec. 1.2".to_string(),
                excerpt: "Minimum lot size...".to_string(),
                document_url: "#".to_string(),
                page: Some(15),
                highlights: None,
            }]),
            confidence: Some(0.86),
        };

        let chunks = build_stream_chunks(&response);
        let combined: String = chunks.concat();

        assert!(combined.starts_with("The minimum lot size"));
        assert!(combined.contains("- Houston Ch. 42 Sec. 1.2 (Page 15)"));
        assert!(combined.contains("**Confidence:** 86%"));
    }

    #[test]
    fn test_build_stream_chunks_no_sources_no_trailer() {
        let response = AgentResponse {
            content: "No grounding found.".to_string(),
            sources: Some(vec![]),
            confidence: None,
        };

        let combined: String = build_stream_chunks(&response).concat();
        assert!(!combined.contains("**Sources:**"));
        assert!(!combined.contains("**Confidence:**"));
    }
}
