//! LLM provider factory.

use crate::client::LlmClient;
use crate::providers::{ClaudeClient, OllamaClient};
use crate::types::ProviderType;
use questline_core::{AppError, AppResult};
use std::sync::Arc;

/// Create an LLM client for the named provider.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama", "claude", "anthropic")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - API key, required by Claude
///
/// # Errors
/// `AppError::Config` when the provider is unknown or a required key is missing.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn LlmClient>> {
    let provider_type = ProviderType::parse(provider)
        .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", provider)))?;

    tracing::debug!("Creating {} client", provider_type.as_str());

    match provider_type {
        ProviderType::Ollama => {
            let client = match endpoint {
                Some(base_url) => OllamaClient::with_base_url(base_url),
                None => OllamaClient::new(),
            };
            Ok(Arc::new(client))
        }
        ProviderType::Claude => {
            let api_key = api_key.ok_or_else(|| {
                AppError::Config("Claude provider requires API key".to_string())
            })?;
            let mut client = ClaudeClient::new(api_key)?;
            if let Some(base_url) = endpoint {
                client = client.with_base_url(base_url);
            }
            Ok(Arc::new(client))
        }
    }
}
