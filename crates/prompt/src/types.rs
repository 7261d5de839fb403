//! Prompt types for the Ordinance agent.

use serde::{Deserialize, Serialize};

/// A phase prompt definition.
///
/// Built-in definitions cover every pipeline phase; operators may override
/// any of them with a YAML file of the same id under `.ordinance/prompts/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier (e.g., "pipeline.clarify")
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// System prompt sent verbatim
    pub system: String,

    /// Handlebars template for the user prompt
    #[serde(rename = "userTemplate", default)]
    pub user_template: String,
}

impl PromptDefinition {
    /// Validate required fields.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("Prompt id cannot be empty".to_string());
        }

        if self.system.is_empty() {
            return Err(format!("Prompt '{}' has an empty system prompt", self.id));
        }

        Ok(())
    }
}
