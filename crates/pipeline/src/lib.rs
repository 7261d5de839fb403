//! Citation-verified answering pipeline for municipal code questions.
//!
//! This crate turns a free-text regulatory question into a cited,
//! confidence-scored answer through four phases executed in strict order:
//!
//! 1. **Clarify** - extract a structured query from the question and
//!    conversation history (never fatal; falls back to the raw query)
//! 2. **Retrieve** - fan out across index namespaces concurrently, merge
//!    and rank candidate passages
//! 3. **Verify** - locate each passage in its source document and confirm
//!    the match semantically, producing confidence-scored citations
//! 4. **Synthesize** - compose a grounded answer with inline citations, an
//!    aggregate confidence, and a source list
//!
//! The [`agent::Agent`] entry point wraps the pipeline with input validation
//! and safe user-facing error messages, in both blocking and streaming
//! flavors.

pub mod agent;
pub mod error;
pub mod index;
pub mod locator;
pub mod phases;
pub mod pipeline;
pub mod types;

// Re-export main types
pub use agent::Agent;
pub use error::{ErrorKind, PipelineError};
pub use index::DocumentIndex;
pub use locator::SourceLocator;
pub use pipeline::{AnswerStream, Pipeline, PipelineRun};
pub use types::{
    AgentOptions, AgentResponse, ClarifiedQuery, Message, PipelinePhase, PipelineState,
    RetrievedDocument, Role, Source, VerifiedCitation,
};
