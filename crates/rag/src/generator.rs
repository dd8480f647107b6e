//! Answer generation, blocking and streaming.
//!
//! Streaming runs the provider in a producer task that republishes every
//! fragment over a bounded channel. The producer always finishes with
//! exactly one terminal event (`Done`, `Error` or `Cancelled`) and then
//! closes the channel.

use futures::StreamExt;
use questline_core::{AppError, AppResult};
use questline_llm::{LlmClient, LlmRequest, LlmUsage};
use questline_prompt::BuiltPrompt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::GenerationConfig;
use crate::types::GeneratedAnswer;

/// Event published by a streaming generation.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Fragment(String),
    Done(GeneratedAnswer),
    Error(String),
    Cancelled,
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Fragment(_))
    }
}

/// Invokes the language model for an assembled prompt.
#[derive(Clone)]
pub struct AnswerGenerator {
    llm: Arc<dyn LlmClient>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    buffer: usize,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, config: &GenerationConfig) -> Self {
        Self {
            llm,
            model: model.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            buffer: config.stream_buffer.max(1),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, prompt: &BuiltPrompt) -> LlmRequest {
        let mut request = LlmRequest::new(prompt.user.clone(), &self.model)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);
        if let Some(system) = &prompt.system {
            request = request.with_system(system.clone());
        }
        request
    }

    /// Single blocking call.
    pub async fn generate(&self, prompt: &BuiltPrompt) -> AppResult<GeneratedAnswer> {
        tracing::debug!(provider = self.llm.provider_name(), model = %self.model, "Generating answer");

        let response = self
            .llm
            .complete(&self.request(prompt))
            .await
            .map_err(|e| AppError::Generation(e.to_string()))?;

        Ok(GeneratedAnswer {
            text: response.content,
            token_usage: response.usage,
            model_id: if response.model.is_empty() {
                self.model.clone()
            } else {
                response.model
            },
        })
    }

    /// Start a streaming generation.
    pub fn generate_stream(&self, prompt: &BuiltPrompt) -> AnswerStream {
        let (tx, rx) = mpsc::channel(self.buffer);
        let cancel = CancellationToken::new();
        let request = self.request(prompt).with_streaming();
        let llm = Arc::clone(&self.llm);
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let terminal = tokio::select! {
                biased;
                _ = token.cancelled() => StreamEvent::Cancelled,
                event = produce(llm, request, &tx) => event,
            };

            match &terminal {
                StreamEvent::Error(message) => tracing::error!("Streaming generation failed: {}", message),
                StreamEvent::Cancelled => tracing::info!("Streaming generation cancelled"),
                _ => {}
            }
            // Consumer may already be gone.
            let _ = tx.send(terminal).await;
        });

        AnswerStream {
            rx,
            cancel,
            handle: Some(handle),
        }
    }
}

async fn produce(llm: Arc<dyn LlmClient>, request: LlmRequest, tx: &mpsc::Sender<StreamEvent>) -> StreamEvent {
    let mut stream = match llm.stream(&request).await {
        Ok(stream) => stream,
        Err(e) => return StreamEvent::Error(e.to_string()),
    };

    let mut text = String::new();
    let mut usage = LlmUsage::default();
    let mut model_id = request.model.clone();

    while let Some(item) = stream.next().await {
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(e) => return StreamEvent::Error(e.to_string()),
        };

        if !chunk.content.is_empty() {
            text.push_str(&chunk.content);
            if tx.send(StreamEvent::Fragment(chunk.content)).await.is_err() {
                return StreamEvent::Cancelled;
            }
        }

        if chunk.done {
            usage = chunk.usage.unwrap_or_default();
            if !chunk.model.is_empty() {
                model_id = chunk.model;
            }
            break;
        }
    }

    StreamEvent::Done(GeneratedAnswer {
        text,
        token_usage: usage,
        model_id,
    })
}

/// Consumer half of a streaming generation.
///
/// Dropping the stream cancels the producer.
pub struct AnswerStream {
    rx: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl AnswerStream {
    /// Next event, `None` once the terminal event has been received.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Ask the producer to stop forwarding fragments.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel, drain to the terminal event and join the producer.
    pub async fn cancel_and_drain(&mut self) -> StreamEvent {
        self.cancel();
        let mut terminal = StreamEvent::Cancelled;
        while let Some(event) = self.rx.recv().await {
            if event.is_terminal() {
                terminal = event;
            }
        }
        self.join().await;
        terminal
    }

    /// Drain the stream into the complete answer.
    pub async fn collect(mut self) -> AppResult<GeneratedAnswer> {
        let mut result = Err(AppError::Generation("Stream ended without completion".to_string()));
        while let Some(event) = self.rx.recv().await {
            match event {
                StreamEvent::Fragment(_) => {}
                StreamEvent::Done(answer) => result = Ok(answer),
                StreamEvent::Error(message) => result = Err(AppError::Generation(message)),
                StreamEvent::Cancelled => {
                    result = Err(AppError::Generation("Generation cancelled".to_string()))
                }
            }
        }
        self.join().await;
        result
    }

    async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!("Generation task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for AnswerStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use questline_llm::{LlmResponse, LlmStream, LlmStreamChunk};
    use questline_prompt::BuiltPromptMetadata;

    /// Replies with fixed pieces, streaming them one by one.
    struct PiecesLlm {
        pieces: Vec<&'static str>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl LlmClient for PiecesLlm {
        fn provider_name(&self) -> &str {
            "pieces"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            Ok(LlmResponse {
                content: self.pieces.concat(),
                model: request.model.clone(),
                usage: LlmUsage::new(12, self.pieces.len() as u32),
            })
        }

        async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
            let model = request.model.clone();
            let mut items: Vec<AppResult<LlmStreamChunk>> = self
                .pieces
                .iter()
                .map(|piece| Ok(LlmStreamChunk::fragment(*piece, model.clone())))
                .collect();
            match self.fail_after {
                Some(n) => {
                    items.truncate(n);
                    items.push(Err(AppError::Llm("connection reset".to_string())));
                }
                None => items.push(Ok(LlmStreamChunk::finished(
                    model,
                    LlmUsage::new(12, self.pieces.len() as u32),
                ))),
            }
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    fn prompt() -> BuiltPrompt {
        BuiltPrompt {
            system: Some("system".to_string()),
            user: "question".to_string(),
            metadata: BuiltPromptMetadata {
                source_prompt_id: "test".to_string(),
                context_blocks: 0,
                history_lines: 0,
            },
        }
    }

    fn generator(pieces: Vec<&'static str>, fail_after: Option<usize>) -> AnswerGenerator {
        AnswerGenerator::new(
            Arc::new(PiecesLlm { pieces, fail_after }),
            "test-model",
            &GenerationConfig {
                stream_buffer: 2,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_stream_matches_blocking() {
        let generator = generator(vec!["Red cubes ", "cost ", "1,200 points."], None);
        let blocking = generator.generate(&prompt()).await.unwrap();

        let mut stream = generator.generate_stream(&prompt());
        let mut fragments = String::new();
        let mut terminal = None;
        while let Some(event) = stream.next_event().await {
            match event {
                StreamEvent::Fragment(text) => fragments.push_str(&text),
                other => terminal = Some(other),
            }
        }

        assert_eq!(fragments, blocking.text);
        match terminal {
            Some(StreamEvent::Done(answer)) => {
                assert_eq!(answer.text, blocking.text);
                assert_eq!(answer.token_usage, blocking.token_usage);
                assert_eq!(answer.model_id, "test-model");
            }
            other => panic!("expected Done, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_provider_error_is_single_terminal_event() {
        let generator = generator(vec!["one ", "two ", "three"], Some(1));
        let mut stream = generator.generate_stream(&prompt());

        let mut events = Vec::new();
        while let Some(event) = stream.next_event().await {
            events.push(event);
        }

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StreamEvent::Fragment("one ".to_string()));
        assert!(matches!(&events[1], StreamEvent::Error(m) if m.contains("connection reset")));
    }

    #[tokio::test]
    async fn test_cancel_and_drain_terminates() {
        let pieces: Vec<&'static str> = vec!["x"; 100];
        let generator = generator(pieces, None);
        let mut stream = generator.generate_stream(&prompt());

        assert!(matches!(stream.next_event().await, Some(StreamEvent::Fragment(_))));
        let terminal = stream.cancel_and_drain().await;
        assert!(terminal.is_terminal());
        assert!(stream.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_collect() {
        let answer = generator(vec!["a", "b"], None)
            .generate_stream(&prompt())
            .collect()
            .await
            .unwrap();
        assert_eq!(answer.text, "ab");

        let failed = generator(vec!["a", "b"], Some(0))
            .generate_stream(&prompt())
            .collect()
            .await;
        assert!(matches!(failed, Err(AppError::Generation(_))));
    }
}
