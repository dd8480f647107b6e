//! Follow-up question rewriting.

use questline_llm::{LlmClient, LlmRequest, LlmUsage};
use questline_prompt::{build_prompt, PromptDefinition, PromptInput};
use std::sync::Arc;

use crate::assembler::history_lines;
use crate::types::ChatTurn;

const CONDENSE_MAX_TOKENS: u32 = 256;

/// Rewrites a follow-up message into a standalone query.
pub struct QueryContextualizer {
    llm: Arc<dyn LlmClient>,
    model: String,
    prompt: PromptDefinition,
}

impl QueryContextualizer {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, prompt: PromptDefinition) -> Self {
        Self {
            llm,
            model: model.into(),
            prompt,
        }
    }

    /// Standalone form of `message`, plus the usage of the rewrite call.
    ///
    /// Without history the message is returned unchanged and the model is
    /// not called. Any failure also yields the original message.
    pub async fn contextualize(&self, message: &str, history: &[ChatTurn]) -> (String, Option<LlmUsage>) {
        if history.is_empty() {
            return (message.to_string(), None);
        }

        let input = PromptInput::new(message).with_history(history_lines(history));
        let prompt = match build_prompt(&self.prompt, &input) {
            Ok(prompt) => prompt,
            Err(e) => {
                tracing::warn!("Failed to build condense prompt, using original message: {}", e);
                return (message.to_string(), None);
            }
        };

        let mut request = LlmRequest::new(prompt.user, &self.model)
            .with_temperature(0.0)
            .with_max_tokens(CONDENSE_MAX_TOKENS);
        if let Some(system) = prompt.system {
            request = request.with_system(system);
        }

        match self.llm.complete(&request).await {
            Ok(response) => {
                let rewritten = response.content.trim();
                if rewritten.is_empty() {
                    tracing::warn!("Query rewrite came back empty, using original message");
                    return (message.to_string(), Some(response.usage));
                }
                tracing::info!(original = message, standalone = rewritten, "Rewrote follow-up question");
                (rewritten.to_string(), Some(response.usage))
            }
            Err(e) => {
                tracing::warn!("Query rewrite failed, using original message: {}", e);
                (message.to_string(), None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use questline_core::{AppError, AppResult};
    use questline_llm::{LlmResponse, LlmStream};
    use questline_prompt::condense_prompt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedLlm {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for FixedLlm {
        fn provider_name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(request.prompt.contains("Follow-up message"));
            match self.reply {
                Some(reply) => Ok(LlmResponse {
                    content: reply.to_string(),
                    model: request.model.clone(),
                    usage: LlmUsage::new(20, 8),
                }),
                None => Err(AppError::Llm("connection refused".to_string())),
            }
        }

        async fn stream(&self, _request: &LlmRequest) -> AppResult<LlmStream> {
            Err(AppError::Llm("not used".to_string()))
        }
    }

    fn contextualizer(reply: Option<&'static str>) -> (QueryContextualizer, Arc<FixedLlm>) {
        let llm = Arc::new(FixedLlm {
            reply,
            calls: AtomicUsize::new(0),
        });
        (
            QueryContextualizer::new(llm.clone(), "test-model", condense_prompt()),
            llm,
        )
    }

    fn history() -> Vec<ChatTurn> {
        vec![
            ChatTurn::user("What does Hard Lucid drop?"),
            ChatTurn::assistant("The Dreamy Belt."),
        ]
    }

    #[tokio::test]
    async fn test_no_history_skips_model() {
        let (contextualizer, llm) = contextualizer(Some("unused"));
        let (query, usage) = contextualizer.contextualize("Hard Lucid drops?", &[]).await;
        assert_eq!(query, "Hard Lucid drops?");
        assert!(usage.is_none());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rewrites_with_history() {
        let (contextualizer, llm) = contextualizer(Some("  What is the drop rate of the Dreamy Belt from Hard Lucid?\n"));
        let (query, usage) = contextualizer.contextualize("And the drop rate?", &history()).await;
        assert_eq!(query, "What is the drop rate of the Dreamy Belt from Hard Lucid?");
        assert_eq!(usage, Some(LlmUsage::new(20, 8)));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_keeps_original() {
        let (contextualizer, _) = contextualizer(None);
        let (query, usage) = contextualizer.contextualize("And the drop rate?", &history()).await;
        assert_eq!(query, "And the drop rate?");
        assert!(usage.is_none());
    }

    #[tokio::test]
    async fn test_empty_rewrite_keeps_original() {
        let (contextualizer, _) = contextualizer(Some("   "));
        let (query, _) = contextualizer.contextualize("And the drop rate?", &history()).await;
        assert_eq!(query, "And the drop rate?");
    }
}
