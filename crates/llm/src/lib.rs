//! LLM integration crate for Questline.
//!
//! Provider-agnostic access to generative models through the [`LlmClient`]
//! trait, with blocking and streaming completions.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//! - **Claude**: Anthropic Messages API
//!
//! # Example
//! ```no_run
//! use questline_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Which bosses drop the Genesis weapon?", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
pub use factory::create_client;
pub use providers::{ClaudeClient, OllamaClient};
pub use types::ProviderType;
