//! Prompt system for Questline.
//!
//! This crate provides structured prompt management with:
//! - YAML-based prompt definitions with built-in defaults
//! - Handlebars template rendering
//! - Retrieved-document and conversation-history injection

pub mod builder;
pub mod defaults;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use defaults::{answer_prompt, condense_prompt, ANSWER_PROMPT_ID, CONDENSE_PROMPT_ID};
pub use loader::{list_prompts, load_prompt, resolve_prompt};
pub use types::{
    BuiltPrompt, BuiltPromptMetadata, ContextBlock, HistoryLine, PromptDefinition, PromptInput,
};
