//! Handlebars rendering for user prompts.

use ordinance_core::{AppError, AppResult};
use std::collections::HashMap;

/// Render a Handlebars template with variables.
///
/// Missing variables render as empty strings; HTML escaping is disabled
/// because the output is plain prompt text.
pub fn render_template(template: &str, variables: &HashMap<String, String>) -> AppResult<String> {
    let mut handlebars = handlebars::Handlebars::new();

    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    let rendered = handlebars
        .render("prompt", &variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))?;

    Ok(rendered)
}
