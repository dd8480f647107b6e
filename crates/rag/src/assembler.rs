//! Prompt assembly for answer generation.

use questline_core::AppResult;
use questline_prompt::{build_prompt, BuiltPrompt, ContextBlock, HistoryLine, PromptDefinition, PromptInput};

use crate::types::{ChatTurn, ValidatedDocument};

/// Context block for one validated document, tagged with its title and
/// section.
pub fn context_block(validated: &ValidatedDocument) -> ContextBlock {
    let document = &validated.document;
    let title = document
        .metadata
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| document.source_id().to_string());

    ContextBlock {
        title,
        section: document.metadata.section.clone(),
        content: document.content.trim().to_string(),
    }
}

pub fn history_lines(history: &[ChatTurn]) -> Vec<HistoryLine> {
    history
        .iter()
        .map(|turn| HistoryLine {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
        })
        .collect()
}

/// Render the answer prompt. Pure and deterministic for identical inputs.
pub fn assemble_prompt(
    definition: &PromptDefinition,
    question: &str,
    documents: &[ValidatedDocument],
    history: &[ChatTurn],
) -> AppResult<BuiltPrompt> {
    let input = PromptInput::new(question)
        .with_context(documents.iter().map(context_block).collect())
        .with_history(history_lines(history));

    let prompt = build_prompt(definition, &input)?;
    tracing::debug!(
        context_blocks = prompt.metadata.context_blocks,
        history_lines = prompt.metadata.history_lines,
        "Assembled answer prompt"
    );
    Ok(prompt)
}
