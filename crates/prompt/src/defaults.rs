//! Built-in prompt definitions used when the workspace provides none.

use crate::types::PromptDefinition;

/// Id of the grounded answer prompt.
pub const ANSWER_PROMPT_ID: &str = "questline.answer";

/// Id of the follow-up condensing prompt.
pub const CONDENSE_PROMPT_ID: &str = "questline.condense";

const ANSWER_SYSTEM: &str = "\
You are a friendly guide for players of a live-service game.
Answer only from the reference documents provided in the context.
If the documents do not contain the answer, say that you could not find it.
Quote numbers, dates, item names and prices exactly as they appear in the documents.
Do not invent figures and do not guess.
Answer in the same language as the question.";

const ANSWER_TEMPLATE: &str = "\
{{#if has_context}}# Reference documents
{{#each context}}
## {{title}}{{#if section}} / {{section}}{{/if}}
{{content}}
{{/each}}
{{/if}}
{{#if has_history}}# Conversation so far
{{#each history}}
{{role}}: {{content}}
{{/each}}
{{/if}}
# Question
{{question}}";

const CONDENSE_SYSTEM: &str = "\
Rewrite the player's latest message as a single standalone question.
Keep every name, number and reference that the conversation gives it.
Do not answer the question. Reply with the rewritten question only.";

const CONDENSE_TEMPLATE: &str = "\
# Conversation
{{#each history}}
{{role}}: {{content}}
{{/each}}

# Follow-up message
{{question}}

# Standalone question";

/// The grounded answer prompt.
pub fn answer_prompt() -> PromptDefinition {
    PromptDefinition {
        id: ANSWER_PROMPT_ID.to_string(),
        title: "Grounded answer".to_string(),
        api_version: "1.0".to_string(),
        created_by: "questline".to_string(),
        system: Some(ANSWER_SYSTEM.to_string()),
        template: ANSWER_TEMPLATE.to_string(),
    }
}

/// The follow-up condensing prompt.
pub fn condense_prompt() -> PromptDefinition {
    PromptDefinition {
        id: CONDENSE_PROMPT_ID.to_string(),
        title: "Standalone question".to_string(),
        api_version: "1.0".to_string(),
        created_by: "questline".to_string(),
        system: Some(CONDENSE_SYSTEM.to_string()),
        template: CONDENSE_TEMPLATE.to_string(),
    }
}

/// Look up a built-in definition by id.
pub fn builtin_prompt(prompt_id: &str) -> Option<PromptDefinition> {
    match prompt_id {
        ANSWER_PROMPT_ID => Some(answer_prompt()),
        CONDENSE_PROMPT_ID => Some(condense_prompt()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(builtin_prompt(ANSWER_PROMPT_ID).unwrap().id, ANSWER_PROMPT_ID);
        assert_eq!(
            builtin_prompt(CONDENSE_PROMPT_ID).unwrap().id,
            CONDENSE_PROMPT_ID
        );
        assert!(builtin_prompt("questline.unknown").is_none());
    }
}
