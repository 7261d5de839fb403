//! Synthesis phase.
//!
//! Reorders citations (verified before unverified), prompts the LLM to
//! compose a grounded answer from them, computes the weighted aggregate
//! confidence, and renders the source list for display.

use crate::error::{ErrorKind, PipelineError};
use crate::types::{
    clamp_confidence, ClarifiedQuery, Highlight, PipelinePhase, Source, SynthesizedResponse,
    VerifiedCitation,
};
use ordinance_llm::{LlmClient, LlmRequest};
use ordinance_prompt::{PromptRegistry, SYNTHESIZE_PROMPT};
use std::collections::HashMap;
use std::sync::Arc;

/// Weight of a verified citation in the aggregate confidence.
const VERIFIED_WEIGHT: f64 = 1.5;

/// Weight of an unverified citation in the aggregate confidence.
const UNVERIFIED_WEIGHT: f64 = 0.5;

/// Synthesis phase executor.
#[derive(Clone)]
pub struct SynthesisPhase {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptRegistry>,
    model: String,
    temperature: f32,
    excerpt_length: usize,
}

impl SynthesisPhase {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptRegistry>,
        model: impl Into<String>,
        temperature: f32,
        excerpt_length: usize,
    ) -> Self {
        Self {
            llm,
            prompts,
            model: model.into(),
            temperature,
            excerpt_length,
        }
    }

    /// Compose the final answer from the verified citations.
    pub async fn execute(
        &self,
        query: &ClarifiedQuery,
        citations: &[VerifiedCitation],
        max_sources: usize,
    ) -> Result<SynthesizedResponse, PipelineError> {
        tracing::info!(citations = citations.len(), "Synthesis phase: creating response");

        // No grounding at all: answer without consulting the LLM
        if citations.is_empty() {
            return Ok(SynthesizedResponse {
                content: ordinance_prompt::messages::NO_RESULTS.to_string(),
                confidence: 0.0,
                sources: Vec::new(),
            });
        }

        let sorted = reorder_citations(citations);
        let citation_context = build_citation_context(&sorted);

        let mut variables = HashMap::new();
        variables.insert("question".to_string(), query.question.clone());
        variables.insert(
            "municipality".to_string(),
            query
                .municipality
                .clone()
                .unwrap_or_else(|| "Not specified".to_string()),
        );
        variables.insert(
            "propertyType".to_string(),
            query
                .property_type
                .clone()
                .unwrap_or_else(|| "Not specified".to_string()),
        );
        variables.insert("citationContext".to_string(), citation_context);

        let prompt = self
            .prompts
            .render_user(SYNTHESIZE_PROMPT, &variables)
            .map_err(|e| {
                PipelineError::new(PipelinePhase::Synthesize, ErrorKind::SynthesisFailed, e.to_string())
            })?;
        let system = self
            .prompts
            .system(SYNTHESIZE_PROMPT)
            .map_err(|e| {
                PipelineError::new(PipelinePhase::Synthesize, ErrorKind::SynthesisFailed, e.to_string())
            })?
            .to_string();

        let request = LlmRequest::new(prompt, &self.model)
            .with_system(system)
            .with_temperature(self.temperature);

        let response = self.llm.complete(&request).await.map_err(|e| {
            PipelineError::new(
                PipelinePhase::Synthesize,
                ErrorKind::SynthesisFailed,
                format!("answer generation failed: {}", e),
            )
        })?;

        let confidence = calculate_confidence(citations);
        let sources = build_sources(&sorted, max_sources, self.excerpt_length);

        tracing::info!(confidence, sources = sources.len(), "Synthesis complete");

        Ok(SynthesizedResponse {
            content: response.content,
            confidence,
            sources,
        })
    }
}

/// Reorder citations so every verified entry precedes every unverified one,
/// each group ordered by confidence descending. The sort is stable, so ties
/// keep their incoming order.
pub fn reorder_citations(citations: &[VerifiedCitation]) -> Vec<VerifiedCitation> {
    let mut sorted = citations.to_vec();
    sorted.sort_by(|a, b| {
        b.is_valid.cmp(&a.is_valid).then(
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });
    sorted
}

/// Enumerate every citation for the LLM prompt with index, validity marker,
/// content, and confidence percentage.
fn build_citation_context(citations: &[VerifiedCitation]) -> String {
    citations
        .iter()
        .enumerate()
        .map(|(index, citation)| {
            let marker = if citation.is_valid {
                "[VERIFIED]"
            } else {
                "[UNVERIFIED]"
            };
            let company_tag = if citation.source.document_id.starts_with("user-") {
                " [Company Document]"
            } else {
                ""
            };

            let mut entry = format!(
                "{}. {} {}{}\n   Content: \"{}\"\n   Confidence: {:.0}%",
                index + 1,
                marker,
                citation.citation,
                company_tag,
                citation.content,
                citation.confidence * 100.0
            );

            if !citation.is_valid {
                entry.push_str("\n   (Unverified - use with caution)");
            }

            entry
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Weighted average of citation confidences: verified citations weigh 1.5,
/// unverified 0.5. Returns 0 when there are no citations.
pub fn calculate_confidence(citations: &[VerifiedCitation]) -> f64 {
    if citations.is_empty() {
        return 0.0;
    }

    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;

    for citation in citations {
        let weight = if citation.is_valid {
            VERIFIED_WEIGHT
        } else {
            UNVERIFIED_WEIGHT
        };
        weighted_sum += citation.confidence * weight;
        total_weight += weight;
    }

    clamp_confidence(weighted_sum / total_weight)
}

/// Render the first `max_sources` citations as display sources.
fn build_sources(
    citations: &[VerifiedCitation],
    max_sources: usize,
    excerpt_length: usize,
) -> Vec<Source> {
    citations
        .iter()
        .take(max_sources)
        .map(|citation| Source {
            title: citation.citation.clone(),
            citation: citation.citation.clone(),
            excerpt: truncate_excerpt(&citation.content, excerpt_length),
            document_url: citation
                .source
                .access_url
                .clone()
                .unwrap_or_else(|| "#".to_string()),
            page: citation.source.page,
            highlights: citation.source.coordinates.map(|coordinates| {
                vec![Highlight {
                    text: citation.content.clone(),
                    coordinates,
                }]
            }),
        })
        .collect()
}

/// Truncate to the character budget with an ellipsis, respecting char
/// boundaries.
fn truncate_excerpt(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(budget).collect();
        format!("{}...", truncated)
    }
}
