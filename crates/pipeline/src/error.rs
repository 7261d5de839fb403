//! Pipeline error taxonomy.
//!
//! Non-fatal kinds are recorded in the pipeline metadata and execution
//! continues; fatal kinds abort the pipeline and surface to the caller as a
//! phase-tagged error with a safe user-facing message.

use crate::types::PipelinePhase;
use thiserror::Error;

/// Classification of pipeline errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Clarification fell back to the raw query (non-fatal)
    ClarificationDegraded,

    /// A secondary namespace search failed (non-fatal, per-namespace)
    NamespaceSearchDegraded,

    /// The primary namespace is unreachable: no usable grounding (fatal)
    RetrievalFailed,

    /// A single document could not be verified (non-fatal, per-document)
    VerificationDegraded,

    /// No answer could be produced (fatal)
    SynthesisFailed,

    /// A phase exceeded its wall-clock budget (fatal)
    Timeout,
}

impl ErrorKind {
    /// Whether this kind aborts the pipeline.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::RetrievalFailed | Self::SynthesisFailed | Self::Timeout
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClarificationDegraded => "clarification-degraded",
            Self::NamespaceSearchDegraded => "namespace-search-degraded",
            Self::RetrievalFailed => "retrieval-failed",
            Self::VerificationDegraded => "verification-degraded",
            Self::SynthesisFailed => "synthesis-failed",
            Self::Timeout => "timeout",
        }
    }
}

/// A phase-tagged pipeline error.
#[derive(Debug, Clone, Error)]
#[error("{} error in {phase} phase: {message}", .kind.as_str())]
pub struct PipelineError {
    pub phase: PipelinePhase,
    pub kind: ErrorKind,
    pub message: String,
}

impl PipelineError {
    pub fn new(phase: PipelinePhase, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            phase,
            kind,
            message: message.into(),
        }
    }

    /// A phase deadline elapsed.
    pub fn timeout(phase: PipelinePhase) -> Self {
        Self::new(
            phase,
            ErrorKind::Timeout,
            format!("{} phase exceeded its time budget", phase),
        )
    }

    /// Safe user-facing message for this error. Never exposes internal
    /// error text.
    pub fn user_message(&self) -> &'static str {
        match self.kind {
            ErrorKind::RetrievalFailed => ordinance_prompt::messages::DATABASE_UNAVAILABLE,
            ErrorKind::SynthesisFailed => ordinance_prompt::messages::SYNTHESIS_FAILED,
            ErrorKind::Timeout => ordinance_prompt::messages::TIMED_OUT,
            _ => ordinance_prompt::messages::PROCESSING_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_kinds() {
        assert!(ErrorKind::RetrievalFailed.is_fatal());
        assert!(ErrorKind::SynthesisFailed.is_fatal());
        assert!(ErrorKind::Timeout.is_fatal());
        assert!(!ErrorKind::ClarificationDegraded.is_fatal());
        assert!(!ErrorKind::NamespaceSearchDegraded.is_fatal());
        assert!(!ErrorKind::VerificationDegraded.is_fatal());
    }

    #[test]
    fn test_error_display_includes_phase() {
        let error = PipelineError::new(
            PipelinePhase::Retrieve,
            ErrorKind::RetrievalFailed,
            "connection refused",
        );

        let text = error.to_string();
        assert!(text.contains("retrieve"));
        assert!(text.contains("retrieval-failed"));
        assert!(text.contains("connection refused"));
    }

    #[test]
    fn test_user_message_hides_internals() {
        let error = PipelineError::new(
            PipelinePhase::Retrieve,
            ErrorKind::RetrievalFailed,
            "chroma: ECONNREFUSED 127.0.0.1:8000",
        );

        assert!(!error.user_message().contains("ECONNREFUSED"));
        assert!(error.user_message().contains("unavailable"));
    }

    #[test]
    fn test_timeout_constructor() {
        let error = PipelineError::timeout(PipelinePhase::Verify);
        assert_eq!(error.kind, ErrorKind::Timeout);
        assert_eq!(error.phase, PipelinePhase::Verify);
    }
}
