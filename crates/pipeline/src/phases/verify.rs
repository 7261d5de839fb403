//! Verification phase.
//!
//! For each retrieved passage: build its citation string, locate the passage
//! in its source document via fuzzy search, and confirm the best candidate
//! semantically. Verification failures are always local; a document that
//! cannot be verified degrades to a low-confidence unverified citation and
//! never aborts the phase.

use crate::locator::{LocateCandidate, SourceLocator};
use crate::types::{
    clamp_confidence, CitationSource, CodeMetadata, PhaseError, PipelinePhase, RetrievedDocument,
    VerifiedCitation,
};
use ordinance_core::config::VerificationConfig;
use ordinance_llm::{LlmClient, LlmRequest};
use ordinance_prompt::{PromptRegistry, SEMANTIC_VERIFY_PROMPT};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Confidence factor for documents with no locator reference.
const NO_SOURCE_FACTOR: f64 = 0.5;

/// Confidence factor when fuzzy search finds no candidates.
const NO_CANDIDATE_FACTOR: f64 = 0.3;

/// Confidence factor when no candidate passes the semantic check.
const NO_MATCH_FACTOR: f64 = 0.4;

/// Semantic confidence assigned by the containment fallback.
const FALLBACK_MATCH_CONFIDENCE: f64 = 0.6;
const FALLBACK_MISMATCH_CONFIDENCE: f64 = 0.2;

/// Parsed model output for the semantic equivalence check.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SemanticVerdict {
    #[serde(rename = "match")]
    pub is_match: bool,
    pub confidence: f64,
    pub explanation: String,
}

/// Verification phase executor.
#[derive(Clone)]
pub struct VerificationPhase {
    llm: Arc<dyn LlmClient>,
    locator: Arc<dyn SourceLocator>,
    prompts: Arc<PromptRegistry>,
    model: String,
    temperature: f32,
    config: VerificationConfig,
}

impl VerificationPhase {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        locator: Arc<dyn SourceLocator>,
        prompts: Arc<PromptRegistry>,
        model: impl Into<String>,
        temperature: f32,
        config: VerificationConfig,
    ) -> Self {
        Self {
            llm,
            locator,
            prompts,
            model: model.into(),
            temperature,
            config,
        }
    }

    /// Verify every retrieved document independently on a bounded worker
    /// pool, then merge and sort the citations by confidence descending.
    pub async fn execute(
        &self,
        documents: &[RetrievedDocument],
    ) -> (Vec<VerifiedCitation>, Vec<PhaseError>) {
        tracing::info!(count = documents.len(), "Verification phase: validating citations");

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut workers = JoinSet::new();

        for (slot, document) in documents.iter().cloned().enumerate() {
            let phase = self.clone();
            let semaphore = semaphore.clone();

            workers.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => phase.process_document(&document).await,
                    Err(_) => phase.degraded_outcome(&document, "worker pool closed"),
                };
                (slot, outcome)
            });
        }

        // Workers write into disjoint slots; only this task merges them back
        let mut slots: Vec<Option<(VerifiedCitation, Option<PhaseError>)>> =
            documents.iter().map(|_| None).collect();

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((slot, outcome)) => slots[slot] = Some(outcome),
                Err(e) => tracing::error!("Verification worker failed: {}", e),
            }
        }

        let mut citations = Vec::with_capacity(documents.len());
        let mut degradations = Vec::new();

        for (slot, outcome) in slots.into_iter().enumerate() {
            let (citation, degradation) = outcome
                .unwrap_or_else(|| self.degraded_outcome(&documents[slot], "worker failed"));
            citations.push(citation);
            degradations.extend(degradation);
        }

        citations.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let verified_count = citations.iter().filter(|c| c.is_valid).count();
        tracing::info!(
            verified = verified_count,
            total = citations.len(),
            "Verification complete"
        );

        (citations, degradations)
    }

    async fn process_document(
        &self,
        document: &RetrievedDocument,
    ) -> (VerifiedCitation, Option<PhaseError>) {
        match self.verify_document(document).await {
            Ok(citation) => (citation, None),
            Err(e) => {
                tracing::warn!(id = %document.id, "Verification degraded: {}", e);
                self.degraded_outcome(document, &e.to_string())
            }
        }
    }

    /// Citation with zero confidence, used when verification itself failed.
    fn degraded_outcome(
        &self,
        document: &RetrievedDocument,
        reason: &str,
    ) -> (VerifiedCitation, Option<PhaseError>) {
        let citation = VerifiedCitation {
            citation: build_citation(&document.metadata),
            content: document.content.clone(),
            is_valid: false,
            confidence: 0.0,
            source: CitationSource {
                document_id: document.id.clone(),
                ..Default::default()
            },
        };

        let error = PhaseError {
            phase: PipelinePhase::Verify,
            message: format!("document '{}' verification degraded: {}", document.id, reason),
        };

        (citation, Some(error))
    }

    async fn verify_document(
        &self,
        document: &RetrievedDocument,
    ) -> ordinance_core::AppResult<VerifiedCitation> {
        let citation = build_citation(&document.metadata);
        let page_hint = document.metadata.page_range.map(|r| r.start);

        // Without a locator reference the citation stays unverified at half
        // the retrieval score; no source location is attempted.
        let Some(source_ref) = document.metadata.source_url.as_deref() else {
            return Ok(VerifiedCitation {
                citation,
                content: document.content.clone(),
                is_valid: false,
                confidence: clamp_confidence(document.score * NO_SOURCE_FACTOR),
                source: CitationSource {
                    document_id: document.id.clone(),
                    page: page_hint,
                    ..Default::default()
                },
            });
        };

        if !self.locator.exists(source_ref).await? {
            tracing::warn!(source_ref, "Source document not reachable");
            return Ok(VerifiedCitation {
                citation,
                content: document.content.clone(),
                is_valid: false,
                confidence: 0.0,
                source: CitationSource {
                    document_id: document.id.clone(),
                    ..Default::default()
                },
            });
        }

        let located = self
            .locator
            .locate(
                source_ref,
                &document.content,
                document.metadata.page_range.as_ref(),
            )
            .await?;

        if !located.found || located.candidates.is_empty() {
            return Ok(VerifiedCitation {
                citation,
                content: document.content.clone(),
                is_valid: false,
                confidence: clamp_confidence(document.score * NO_CANDIDATE_FACTOR),
                source: CitationSource {
                    document_id: document.id.clone(),
                    page: page_hint,
                    ..Default::default()
                },
            });
        }

        // Judge each candidate above the similarity floor, then pick the
        // best via a pure fold over the verdicts
        let mut judged = Vec::new();
        for candidate in located.candidates.into_iter().take(self.config.max_candidates) {
            if candidate.similarity < self.config.min_similarity {
                continue;
            }

            let verdict = self.semantic_match(&document.content, &candidate.text).await;
            judged.push((candidate, verdict));
        }

        match select_best(&judged) {
            Some((best, combined)) => {
                let access_url = match self.locator.access_url(source_ref).await {
                    Ok(url) => Some(url),
                    Err(e) => {
                        tracing::warn!(source_ref, "Could not mint access URL: {}", e);
                        None
                    }
                };

                tracing::debug!(
                    id = %document.id,
                    page = best.page,
                    combined,
                    "Citation verified"
                );

                Ok(VerifiedCitation {
                    citation,
                    // The verified source text replaces the indexed passage
                    content: best.text.clone(),
                    is_valid: true,
                    confidence: clamp_confidence(document.score * combined),
                    source: CitationSource {
                        document_id: document.id.clone(),
                        page: Some(best.page),
                        coordinates: Some(best.coordinates),
                        access_url,
                    },
                })
            }
            None => Ok(VerifiedCitation {
                citation,
                content: document.content.clone(),
                is_valid: false,
                confidence: clamp_confidence(document.score * NO_MATCH_FACTOR),
                source: CitationSource {
                    document_id: document.id.clone(),
                    page: page_hint,
                    ..Default::default()
                },
            }),
        }
    }

    /// AI semantic-equivalence check with a containment-heuristic fallback.
    async fn semantic_match(&self, original: &str, candidate: &str) -> SemanticVerdict {
        match self.semantic_match_llm(original, candidate).await {
            Ok(mut verdict) => {
                verdict.confidence = clamp_confidence(verdict.confidence);
                verdict
            }
            Err(e) => {
                tracing::warn!("Semantic check fell back to containment heuristic: {}", e);
                let matched = containment_match(original, candidate);
                SemanticVerdict {
                    is_match: matched,
                    confidence: if matched {
                        FALLBACK_MATCH_CONFIDENCE
                    } else {
                        FALLBACK_MISMATCH_CONFIDENCE
                    },
                    explanation: "Fallback comparison used".to_string(),
                }
            }
        }
    }

    async fn semantic_match_llm(
        &self,
        original: &str,
        candidate: &str,
    ) -> ordinance_core::AppResult<SemanticVerdict> {
        let system = self.prompts.system(SEMANTIC_VERIFY_PROMPT)?.to_string();

        let mut variables = HashMap::new();
        variables.insert("original".to_string(), original.to_string());
        variables.insert("candidate".to_string(), candidate.to_string());
        let prompt = self.prompts.render_user(SEMANTIC_VERIFY_PROMPT, &variables)?;

        let request = LlmRequest::new(prompt, &self.model)
            .with_system(system)
            .with_temperature(self.temperature)
            .with_max_tokens(200);

        let response = self.llm.complete(&request).await?;
        super::parse_json_reply(&response.content)
    }
}

/// Build the formatted citation string from passage metadata.
///
/// The chapter segment is omitted entirely for internal/company policy
/// documents (`chapter == "Internal"`), and any segment whose source field
/// is absent is skipped.
pub fn build_citation(metadata: &CodeMetadata) -> String {
    let mut parts = vec![metadata.municipality.clone()];

    if !metadata.chapter.is_empty() && metadata.chapter != "Internal" {
        parts.push(format!("Ch. {}", metadata.chapter));
    }

    if !metadata.section.is_empty() {
        parts.push(format!("Sec. {}", metadata.section));
    }

    if let Some(ref subsection) = metadata.subsection {
        if !subsection.is_empty() {
            parts.push(format!("({})", subsection));
        }
    }

    if !metadata.title.is_empty() {
        parts.push(format!("- {}", metadata.title));
    }

    parts.join(" ")
}

/// Pure fold over judged candidates: the highest `similarity × semantic
/// confidence` among positive verdicts wins. A combined score of zero never
/// wins.
fn select_best(judged: &[(LocateCandidate, SemanticVerdict)]) -> Option<(&LocateCandidate, f64)> {
    let (best, best_score) = judged.iter().fold(
        (None, 0.0_f64),
        |(best, best_score), (candidate, verdict)| {
            let combined = candidate.similarity * verdict.confidence;
            if verdict.is_match && combined > best_score {
                (Some(candidate), combined)
            } else {
                (best, best_score)
            }
        },
    );

    best.map(|candidate| (candidate, best_score))
}

/// Normalized substring containment: true when either text contains the
/// other after stripping punctuation and collapsing whitespace.
fn containment_match(a: &str, b: &str) -> bool {
    let normalized_a = normalize_text(a);
    let normalized_b = normalize_text(b);

    if normalized_a.is_empty() || normalized_b.is_empty() {
        return false;
    }

    normalized_a.contains(&normalized_b) || normalized_b.contains(&normalized_a)
}

fn normalize_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped: String = lowered
        .chars()
        .filter(|c| !matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | '\'' | '"'))
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
