//! Pipeline data model.
//!
//! All entities here are created fresh per pipeline invocation and discarded
//! once the response is returned. The orchestrator is the single logical
//! owner of [`PipelineState`]; concurrent workers inside a phase write into
//! disjoint result slots that are merged back by the coordinating task.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Pipeline phase identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelinePhase {
    Clarify,
    Retrieve,
    Verify,
    Synthesize,
}

impl PipelinePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clarify => "clarify",
            Self::Retrieve => "retrieve",
            Self::Verify => "verify",
            Self::Synthesize => "synthesize",
        }
    }
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversation message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A conversation history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Structured intent extracted from the user's question.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClarifiedQuery {
    /// Cleaned-up version of the question
    pub question: String,

    /// Municipality/city the question is about
    pub municipality: Option<String>,

    /// Full address if provided
    pub address: Option<String>,

    /// Property type (residential, commercial, industrial)
    pub property_type: Option<String>,

    /// Specific code sections or topics mentioned
    pub specific_codes: Vec<String>,

    /// Any other extracted context
    pub context: HashMap<String, serde_json::Value>,
}

impl ClarifiedQuery {
    /// Fallback query used when clarification is skipped or fails: the raw
    /// query with no extracted fields.
    pub fn from_raw(query: &str) -> Self {
        let mut context = HashMap::new();
        context.insert(
            "rawQuery".to_string(),
            serde_json::Value::String(query.to_string()),
        );

        Self {
            question: query.to_string(),
            context,
            ..Default::default()
        }
    }
}

/// Which index namespace a document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    General,
    User,
    Company,
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::General => f.write_str("general"),
            Self::User => f.write_str("user"),
            Self::Company => f.write_str("company"),
        }
    }
}

/// Page range within a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

/// Kind of regulatory document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    BuildingCode,
    Zoning,
    Ordinance,
    Amendment,
}

/// Metadata attached to an indexed code passage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CodeMetadata {
    pub municipality: String,
    pub state: Option<String>,
    /// Chapter number; the value "Internal" marks a company policy document
    pub chapter: String,
    pub section: String,
    pub subsection: Option<String>,
    pub title: String,
    pub effective_date: Option<NaiveDate>,
    pub document_type: Option<DocumentType>,
    /// Opaque locator reference for the source document
    pub source_url: Option<String>,
    pub page_range: Option<PageRange>,
}

/// A passage retrieved from the document index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: String,
    pub content: String,
    pub metadata: CodeMetadata,
    /// Retrieval relevance on the index-defined scale; comparable within one run
    pub score: f64,
    pub source: Namespace,
}

/// Rectangle within a source document page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Where a verified citation was located.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CitationSource {
    pub document_id: String,
    pub page: Option<u32>,
    pub coordinates: Option<BoundingBox>,
    pub access_url: Option<String>,
}

/// A citation after verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedCitation {
    /// Formatted human-readable reference
    pub citation: String,

    /// The verified source text, or the original passage when unverified
    pub content: String,

    pub is_valid: bool,

    /// Trust score, always within [0, 1]
    pub confidence: f64,

    pub source: CitationSource,
}

/// Highlight for rendering a citation inside its source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Highlight {
    pub text: String,
    pub coordinates: BoundingBox,
}

/// Output-facing source reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub title: String,
    pub citation: String,
    pub excerpt: String,
    pub document_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlights: Option<Vec<Highlight>>,
}

/// The synthesized answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedResponse {
    pub content: String,
    pub confidence: f64,
    pub sources: Vec<Source>,
}

/// An error recorded during a phase. Append-only; a non-empty error list
/// does not by itself mean the pipeline failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseError {
    pub phase: PipelinePhase,
    pub message: String,
}

/// Timing and error bookkeeping for one pipeline invocation.
#[derive(Debug, Clone)]
pub struct PipelineMetadata {
    pub start_time: DateTime<Utc>,
    /// One entry per phase that ran or was explicitly skipped (skipped
    /// phases record a zero duration)
    pub phase_timings: HashMap<PipelinePhase, Duration>,
    pub errors: Vec<PhaseError>,
}

impl Default for PipelineMetadata {
    fn default() -> Self {
        Self {
            start_time: Utc::now(),
            phase_timings: HashMap::new(),
            errors: Vec::new(),
        }
    }
}

/// State owned by the orchestrator for the duration of one invocation.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub original_query: String,
    pub clarified_query: ClarifiedQuery,
    pub retrieved_documents: Vec<RetrievedDocument>,
    pub verified_citations: Vec<VerifiedCitation>,
    pub synthesized_response: Option<SynthesizedResponse>,
    pub metadata: PipelineMetadata,
}

impl PipelineState {
    pub fn new(original_query: impl Into<String>) -> Self {
        Self {
            original_query: original_query.into(),
            clarified_query: ClarifiedQuery::default(),
            retrieved_documents: Vec::new(),
            verified_citations: Vec::new(),
            synthesized_response: None,
            metadata: PipelineMetadata::default(),
        }
    }
}

/// Options accepted by the agent entry point.
#[derive(Debug, Clone, Default)]
pub struct AgentOptions {
    /// Use the raw query without running the clarification phase
    pub skip_clarification: bool,

    /// Include the aggregate confidence in the response
    pub include_confidence: bool,

    /// Cap on the number of sources returned (library default when unset)
    pub max_sources: Option<usize>,
}

/// Response returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Clamp a confidence value to [0, 1].
pub fn clamp_confidence(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
