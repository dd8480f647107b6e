//! Prompt types.
//!
//! A prompt definition is a pair of Handlebars templates (system + user)
//! identified by id. Definitions are pure data; rendering lives in
//! [`crate::builder`].

use serde::{Deserialize, Serialize};

/// A prompt definition, either built in or loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Creator identifier
    #[serde(rename = "createdBy", default)]
    pub created_by: String,

    /// System template (persona and grounding rules)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// User template with Handlebars syntax
    pub template: String,
}

/// One retrieved document as the prompt sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBlock {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub content: String,
}

/// One prior conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryLine {
    /// "user" or "assistant"
    pub role: String,
    pub content: String,
}

/// Everything a template can reference.
///
/// Templates see `question`, `context` (list of [`ContextBlock`]),
/// `history` (list of [`HistoryLine`]) and the `has_context` /
/// `has_history` flags.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptInput {
    pub question: String,
    pub context: Vec<ContextBlock>,
    pub history: Vec<HistoryLine>,
}

impl PromptInput {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context: Vec<ContextBlock>) -> Self {
        self.context = context;
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryLine>) -> Self {
        self.history = history;
        self
    }
}

/// A fully built prompt ready for LLM execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuiltPrompt {
    /// System message (optional)
    pub system: Option<String>,

    /// User message (required)
    pub user: String,

    /// Metadata about the built prompt
    pub metadata: BuiltPromptMetadata,
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuiltPromptMetadata {
    /// Source prompt ID
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,

    /// Number of context blocks rendered
    #[serde(rename = "contextBlocks")]
    pub context_blocks: usize,

    /// Number of history messages rendered
    #[serde(rename = "historyLines")]
    pub history_lines: usize,
}
