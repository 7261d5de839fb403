//! Prompt system for the Ordinance agent.
//!
//! This crate owns every piece of text the pipeline sends to an LLM or shows
//! to a user on failure:
//! - Built-in phase prompt definitions (clarify, semantic verify, synthesize)
//! - Optional YAML overrides loaded from `.ordinance/prompts/`
//! - Handlebars rendering for user prompts
//! - Canonical user-facing error and status messages

pub mod builder;
pub mod messages;
pub mod registry;
pub mod types;

// Re-export main types
pub use builder::render_template;
pub use registry::{PromptRegistry, CLARIFY_PROMPT, SEMANTIC_VERIFY_PROMPT, SYNTHESIZE_PROMPT};
pub use types::PromptDefinition;
