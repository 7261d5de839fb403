//! Pipeline phase implementations.

pub mod clarify;
pub mod retrieve;
pub mod synthesize;
pub mod verify;

pub use clarify::ClarificationPhase;
pub use retrieve::RetrievalPhase;
pub use synthesize::SynthesisPhase;
pub use verify::VerificationPhase;

use ordinance_core::{AppError, AppResult};

/// Parse a JSON object out of an LLM reply.
///
/// Models frequently wrap JSON in markdown code fences or surround it with
/// prose; strip down to the outermost object before deserializing. Callers
/// apply their documented fallback on error.
pub(crate) fn parse_json_reply<T: serde::de::DeserializeOwned>(reply: &str) -> AppResult<T> {
    let trimmed = reply.trim();

    let stripped = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end_matches("```"))
        .unwrap_or(trimmed)
        .trim();

    // Fall back to the outermost braces when prose surrounds the object
    let candidate = match (stripped.find('{'), stripped.rfind('}')) {
        (Some(start), Some(end)) if start < end => &stripped[start..=end],
        _ => stripped,
    };

    serde_json::from_str(candidate)
        .map_err(|e| AppError::Serialization(format!("Malformed model output: {}", e)))
}
