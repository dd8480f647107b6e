//! Prompt builder: renders a definition's templates against a [`PromptInput`].

use crate::types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PromptInput};
use handlebars::Handlebars;
use questline_core::{AppError, AppResult};
use serde_json::{json, Value};

/// Build a prompt from a definition and its input.
///
/// Pure: no I/O, and identical inputs always render identical prompts.
///
/// # Example
/// ```
/// use questline_prompt::{answer_prompt, build_prompt, PromptInput};
///
/// let built = build_prompt(&answer_prompt(), &PromptInput::new("Where is the shop?")).unwrap();
/// assert!(built.user.contains("Where is the shop?"));
/// ```
pub fn build_prompt(definition: &PromptDefinition, input: &PromptInput) -> AppResult<BuiltPrompt> {
    tracing::debug!(
        prompt_id = %definition.id,
        context_blocks = input.context.len(),
        history_lines = input.history.len(),
        "Building prompt"
    );

    let data = template_data(input);

    let system = definition
        .system
        .as_deref()
        .map(|template| render_template(template, &data))
        .transpose()?;
    let user = render_template(&definition.template, &data)?;

    Ok(BuiltPrompt {
        system,
        user: user.trim().to_string(),
        metadata: BuiltPromptMetadata {
            source_prompt_id: definition.id.clone(),
            context_blocks: input.context.len(),
            history_lines: input.history.len(),
        },
    })
}

fn template_data(input: &PromptInput) -> Value {
    json!({
        "question": input.question,
        "context": input.context,
        "history": input.history,
        "has_context": !input.context.is_empty(),
        "has_history": !input.history.is_empty(),
    })
}

/// Render a Handlebars template with plain-text (non-HTML) escaping.
fn render_template(template: &str, data: &Value) -> AppResult<String> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", data)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}
