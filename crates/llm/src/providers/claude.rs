//! Anthropic Claude provider implementation.
//!
//! Messages API: https://docs.anthropic.com/en/api/messages

use super::LineBuffer;
use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use futures::StreamExt;
use questline_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Whole-request bound; covers streamed answers too.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: ClaudeUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
struct ClaudeUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// One server-sent event payload.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        message: StreamMessage,
    },
    ContentBlockDelta {
        delta: Delta,
    },
    MessageDelta {
        #[serde(default)]
        usage: ClaudeUsage,
    },
    MessageStop,
    Error {
        error: StreamError,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage: ClaudeUsage,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}

/// Per-stream bookkeeping carried between SSE events.
#[derive(Debug, Default)]
struct StreamState {
    lines: LineBuffer,
    model: String,
    input_tokens: u32,
    output_tokens: u32,
}

impl StreamState {
    /// Translate one SSE line into at most one chunk.
    fn handle_line(&mut self, line: &str) -> Option<AppResult<LlmStreamChunk>> {
        // `event:` lines repeat the type carried in the data payload.
        let payload = line.strip_prefix("data:")?.trim();
        let event: StreamEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(e) => {
                return Some(Err(AppError::Llm(format!(
                    "Failed to parse Claude event: {}",
                    e
                ))))
            }
        };

        match event {
            StreamEvent::MessageStart { message } => {
                self.model = message.model;
                self.input_tokens = message.usage.input_tokens;
                None
            }
            StreamEvent::ContentBlockDelta { delta } if delta.kind == "text_delta" => Some(Ok(
                LlmStreamChunk::fragment(delta.text, self.model.clone()),
            )),
            StreamEvent::ContentBlockDelta { .. } => None,
            StreamEvent::MessageDelta { usage } => {
                self.output_tokens = usage.output_tokens;
                None
            }
            StreamEvent::MessageStop => Some(Ok(LlmStreamChunk::finished(
                self.model.clone(),
                LlmUsage::new(self.input_tokens, self.output_tokens),
            ))),
            StreamEvent::Error { error } => Some(Err(AppError::Llm(format!(
                "Claude stream error: {}",
                error.message
            )))),
            StreamEvent::Other => None,
        }
    }
}

/// Claude client over the Messages API.
pub struct ClaudeClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl ClaudeClient {
    pub fn new(api_key: impl Into<String>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        })
    }

    /// Point the client at a proxy or alternative deployment.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn to_claude_request(&self, request: &LlmRequest, stream: bool) -> ClaudeRequest {
        ClaudeRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: request.system.clone(),
            messages: vec![ClaudeMessage {
                role: "user",
                content: request.prompt.clone(),
            }],
            temperature: request.temperature,
            stream,
        }
    }

    async fn send(&self, request: &ClaudeRequest) -> AppResult<reqwest::Response> {
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Claude: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "Claude API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

impl ClaudeResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect()
    }
}

#[async_trait::async_trait]
impl LlmClient for ClaudeClient {
    fn provider_name(&self) -> &str {
        "claude"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(model = %request.model, "Sending completion request to Claude");

        let response = self.send(&self.to_claude_request(request, false)).await?;
        let parsed: ClaudeResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Claude response: {}", e)))?;

        let usage = LlmUsage::new(parsed.usage.input_tokens, parsed.usage.output_tokens);
        tracing::debug!(
            "Received completion from Claude ({} tokens)",
            usage.total_tokens
        );

        Ok(LlmResponse {
            content: parsed.text(),
            model: parsed.model,
            usage,
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::debug!(model = %request.model, "Starting streaming request to Claude");

        let response = self.send(&self.to_claude_request(request, true)).await?;
        let initial = StreamState {
            model: request.model.clone(),
            ..StreamState::default()
        };

        let stream = response
            .bytes_stream()
            .scan(initial, |state, result| {
                let chunks: Vec<AppResult<LlmStreamChunk>> = match result {
                    Ok(bytes) => state
                        .lines
                        .push(&bytes)
                        .into_iter()
                        .filter_map(|line| state.handle_line(&line))
                        .collect(),
                    Err(e) => vec![Err(AppError::Llm(format!("Stream error: {}", e)))],
                };
                futures::future::ready(Some(futures::stream::iter(chunks)))
            })
            .flatten();

        Ok(Box::pin(stream))
    }
}
