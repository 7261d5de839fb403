//! Built-in phase prompts and the prompt registry.
//!
//! The registry holds one [`PromptDefinition`] per pipeline phase. Built-in
//! definitions carry the canonical instructions; a YAML file named
//! `<id>.yml` in `.ordinance/prompts/` replaces the built-in of the same id.

use crate::types::PromptDefinition;
use ordinance_core::{AppError, AppResult};
use std::collections::HashMap;
use std::path::Path;

/// Prompt id for the clarification phase.
pub const CLARIFY_PROMPT: &str = "pipeline.clarify";

/// Prompt id for the semantic verification check.
pub const SEMANTIC_VERIFY_PROMPT: &str = "pipeline.verify.semantic";

/// Prompt id for the synthesis phase.
pub const SYNTHESIZE_PROMPT: &str = "pipeline.synthesize";

const CLARIFY_SYSTEM: &str = r#"You are the clarification phase of a municipal code assistant.
Your job is to analyze user queries about building codes and extract key information.

Extract the following if present:
- Municipality/City (required)
- Specific address (if mentioned)
- Property type (residential, commercial, industrial)
- Specific code sections or topics they're asking about
- Any other relevant context

If critical information is missing (especially municipality), generate clarifying questions.
Be concise and professional.

Output a JSON object with:
{
  "needsClarification": boolean,
  "clarifyingQuestions": ["list of questions, empty if none needed"],
  "extractedInfo": {
    "question": "cleaned up version of the question",
    "municipality": "city name",
    "address": "full address if provided",
    "propertyType": "type if mentioned",
    "specificCodes": ["list", "of", "code", "references"],
    "context": { "any": "other relevant info" }
  }
}

Respond with the JSON object only."#;

const SEMANTIC_VERIFY_SYSTEM: &str = r#"You are a verification assistant comparing two text passages about building codes.
Your job is to determine if they convey the same regulatory requirement, even if the wording differs slightly.

Consider these passages as MATCHING if:
- They describe the same requirement with minor formatting differences
- Numbers and measurements are the same
- One is a subset or summary of the other
- Only punctuation, spacing, or minor words differ

Consider them NOT MATCHING if:
- Numbers or measurements differ
- They describe different requirements
- Key terms or conditions are different

Respond with a JSON object:
{
  "match": true/false,
  "confidence": 0.0-1.0,
  "explanation": "brief explanation"
}"#;

const SEMANTIC_VERIFY_TEMPLATE: &str = r#"Original: "{{original}}"

Candidate: "{{candidate}}""#;

const SYNTHESIZE_SYSTEM: &str = r#"You are the synthesis phase of a municipal code assistant.
Your job is to create a comprehensive, accurate response based on verified citations.

Guidelines:
1. Use ONLY information from the provided citations
2. Clearly distinguish between general codes and company-specific policies
3. Include citation references in your response
4. Be precise about requirements (use exact numbers, measurements, etc.)
5. If there are conflicting sources, explain the discrepancy
6. Structure your response clearly with sections if needed

IMPORTANT - Handling Unverified Citations:
- Citations marked as unverified could not be located in the source documents
- You MAY still use them but MUST add a clear warning
- Format: "Note: The following information could not be verified in source documents: [content]"
- If ALL citations are unverified, begin your response with a disclaimer

Format citations as: [Municipality Ch. X Sec. Y]
Mark company policies clearly: "Company Policy: ..."
Verified citations can be stated as fact.
Unverified citations MUST include the warning."#;

const SYNTHESIZE_TEMPLATE: &str = r#"Query: {{question}}
Municipality: {{municipality}}
Property Type: {{propertyType}}

Verified Citations:
{{citationContext}}

Please provide a comprehensive answer to the query using only the information from these citations."#;

/// Registry of phase prompt definitions.
#[derive(Debug, Clone)]
pub struct PromptRegistry {
    prompts: HashMap<String, PromptDefinition>,
}

impl PromptRegistry {
    /// Build the registry with only the built-in definitions.
    pub fn builtin() -> Self {
        let mut prompts = HashMap::new();

        for def in builtin_definitions() {
            prompts.insert(def.id.clone(), def);
        }

        Self { prompts }
    }

    /// Build the registry with built-ins plus YAML overrides from the
    /// workspace's `.ordinance/prompts/` directory.
    ///
    /// Unknown ids in the override directory are rejected so typos do not
    /// silently leave the built-in in place.
    pub fn with_overrides(workspace: &Path) -> AppResult<Self> {
        let mut registry = Self::builtin();
        let prompts_dir = workspace.join(".ordinance/prompts");

        if !prompts_dir.exists() {
            return Ok(registry);
        }

        for entry in walkdir::WalkDir::new(&prompts_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("yml") {
                continue;
            }

            let contents = std::fs::read_to_string(path).map_err(|e| {
                AppError::Prompt(format!("Failed to read prompt file {:?}: {}", path, e))
            })?;

            let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
                AppError::Prompt(format!("Failed to parse prompt YAML {:?}: {}", path, e))
            })?;

            definition.validate().map_err(AppError::Prompt)?;

            if !registry.prompts.contains_key(&definition.id) {
                return Err(AppError::Prompt(format!(
                    "Override {:?} targets unknown prompt id '{}'",
                    path, definition.id
                )));
            }

            tracing::info!("Prompt override loaded: {}", definition.id);
            registry.prompts.insert(definition.id.clone(), definition);
        }

        Ok(registry)
    }

    /// Look up a prompt definition by id.
    pub fn get(&self, id: &str) -> AppResult<&PromptDefinition> {
        self.prompts
            .get(id)
            .ok_or_else(|| AppError::Prompt(format!("Unknown prompt id: {}", id)))
    }

    /// Get the system prompt for an id.
    pub fn system(&self, id: &str) -> AppResult<&str> {
        Ok(self.get(id)?.system.as_str())
    }

    /// Render the user template for an id with the given variables.
    pub fn render_user(&self, id: &str, variables: &HashMap<String, String>) -> AppResult<String> {
        let definition = self.get(id)?;
        crate::builder::render_template(&definition.user_template, variables)
    }
}

fn builtin_definitions() -> Vec<PromptDefinition> {
    vec![
        PromptDefinition {
            id: CLARIFY_PROMPT.to_string(),
            title: "Clarification".to_string(),
            system: CLARIFY_SYSTEM.to_string(),
            user_template: "{{question}}".to_string(),
        },
        PromptDefinition {
            id: SEMANTIC_VERIFY_PROMPT.to_string(),
            title: "Semantic verification".to_string(),
            system: SEMANTIC_VERIFY_SYSTEM.to_string(),
            user_template: SEMANTIC_VERIFY_TEMPLATE.to_string(),
        },
        PromptDefinition {
            id: SYNTHESIZE_PROMPT.to_string(),
            title: "Synthesis".to_string(),
            system: SYNTHESIZE_SYSTEM.to_string(),
            user_template: SYNTHESIZE_TEMPLATE.to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_registry_has_all_phases() {
        let registry = PromptRegistry::builtin();
        assert!(registry.get(CLARIFY_PROMPT).is_ok());
        assert!(registry.get(SEMANTIC_VERIFY_PROMPT).is_ok());
        assert!(registry.get(SYNTHESIZE_PROMPT).is_ok());
        assert!(registry.get("pipeline.unknown").is_err());
    }

    #[test]
    fn test_builtin_definitions_validate() {
        for def in builtin_definitions() {
            assert!(def.validate().is_ok(), "invalid builtin: {}", def.id);
        }
    }

    #[test]
    fn test_render_semantic_verify_user() {
        let registry = PromptRegistry::builtin();
        let mut vars = HashMap::new();
        vars.insert("original".to_string(), "lot size 1,400 sq ft".to_string());
        vars.insert("candidate".to_string(), "lot size 1400 sq ft".to_string());

        let rendered = registry.render_user(SEMANTIC_VERIFY_PROMPT, &vars).unwrap();
        assert!(rendered.contains("Original: \"lot size 1,400 sq ft\""));
        assert!(rendered.contains("Candidate: \"lot size 1400 sq ft\""));
    }

    #[test]
    fn test_override_replaces_builtin() {
        let dir = TempDir::new().unwrap();
        let prompts_dir = dir.path().join(".ordinance/prompts");
        fs::create_dir_all(&prompts_dir).unwrap();
        fs::write(
            prompts_dir.join("pipeline.clarify.yml"),
            r#"
id: pipeline.clarify
title: Custom clarify
system: "Custom system prompt."
userTemplate: "{{question}}"
"#,
        )
        .unwrap();

        let registry = PromptRegistry::with_overrides(dir.path()).unwrap();
        assert_eq!(
            registry.system(CLARIFY_PROMPT).unwrap(),
            "Custom system prompt."
        );
        // Other prompts untouched
        assert!(registry
            .system(SYNTHESIZE_PROMPT)
            .unwrap()
            .contains("synthesis phase"));
    }

    #[test]
    fn test_override_unknown_id_rejected() {
        let dir = TempDir::new().unwrap();
        let prompts_dir = dir.path().join(".ordinance/prompts");
        fs::create_dir_all(&prompts_dir).unwrap();
        fs::write(
            prompts_dir.join("mystery.yml"),
            r#"
id: pipeline.mystery
title: Mystery
system: "?"
"#,
        )
        .unwrap();

        assert!(PromptRegistry::with_overrides(dir.path()).is_err());
    }

    #[test]
    fn test_no_override_dir_is_fine() {
        let dir = TempDir::new().unwrap();
        let registry = PromptRegistry::with_overrides(dir.path()).unwrap();
        assert!(registry.get(CLARIFY_PROMPT).is_ok());
    }
}
