//! The chat service: one straight-line pass through every pipeline stage.
//!
//! ```text
//! message ─► contextualize ─► retrieve ─► relevance filter ─┬─► fallback
//!                                                            └─► assemble ─► generate ─► validate ─► cite
//! ```
//!
//! The session guard is held from history read until the exchange is
//! recorded, so requests for one session never interleave.

use questline_core::config::AppConfig;
use questline_core::{AppError, AppResult};
use questline_llm::{create_client, LlmClient, LlmUsage};
use questline_prompt::{answer_prompt, condense_prompt, resolve_prompt, BuiltPrompt, PromptDefinition};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::assembler::assemble_prompt;
use crate::cache::{cache_key, MemoryResponseCache, ResponseCache};
use crate::citations::{format_reference_block, SourceExtractor};
use crate::config::{load_pipeline_config, PipelineConfig};
use crate::contextualizer::QueryContextualizer;
use crate::embeddings::OllamaEmbedder;
use crate::generator::{AnswerGenerator, StreamEvent};
use crate::relevance::RelevanceValidator;
use crate::retriever::{QdrantStore, Retriever, VectorStore};
use crate::session::{ChatSession, SessionStore};
use crate::types::{
    ChatRequest, ChatResponse, ChatTurn, GeneratedAnswer, ResponseMetadata, ValidatedDocument,
};
use crate::validator::ResponseValidator;

/// Answer returned when no document clears the relevance threshold.
pub const FALLBACK_ANSWER: &str = "I could not find relevant information about that in the knowledge base. \
Try rephrasing your question or asking about a specific event or item.";

/// Everything the service is built from.
pub struct ServiceContext {
    pub llm: Arc<dyn LlmClient>,
    pub model: String,
    pub store: Arc<dyn VectorStore>,
    pub config: PipelineConfig,
    pub answer_prompt: PromptDefinition,
    pub condense_prompt: PromptDefinition,
    pub cache: Option<Arc<dyn ResponseCache>>,
}

impl ServiceContext {
    /// Context with the built-in prompts and the cache the config asks for.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        store: Arc<dyn VectorStore>,
        config: PipelineConfig,
    ) -> Self {
        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(MemoryResponseCache::new(&config.cache)) as Arc<dyn ResponseCache>);

        Self {
            llm,
            model: model.into(),
            store,
            config,
            answer_prompt: answer_prompt(),
            condense_prompt: condense_prompt(),
            cache,
        }
    }

    pub fn with_prompts(mut self, answer: PromptDefinition, condense: PromptDefinition) -> Self {
        self.answer_prompt = answer;
        self.condense_prompt = condense;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Wire the production collaborators for a workspace: the configured
    /// generation provider, Qdrant over an Ollama embedder, and any prompt
    /// overrides under `.questline/prompts`.
    pub fn from_workspace(workspace: &Path, app: &AppConfig) -> AppResult<Self> {
        let config = load_pipeline_config(workspace)?;

        let api_key = app.resolve_api_key(&app.provider);
        let llm = create_client(&app.provider, app.provider_endpoint(), api_key.as_deref())?;

        let embedder = Arc::new(OllamaEmbedder::new(&config.embedding)?);
        let store = Arc::new(QdrantStore::new(&config.vector_store, embedder)?);

        let answer = resolve_prompt(workspace, &config.prompts.answer)?;
        let condense = resolve_prompt(workspace, &config.prompts.condense)?;

        tracing::info!(
            provider = %app.provider,
            model = %app.model,
            collection = %config.vector_store.collection,
            "Service context ready"
        );

        Ok(Self::new(llm, app.model.clone(), store, config).with_prompts(answer, condense))
    }
}

/// Event delivered by [`ChatService::chat_stream`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Fragment(String),
    Done(Box<ChatResponse>),
    /// User-safe failure message.
    Error(String),
    Cancelled,
}

impl ChatEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChatEvent::Fragment(_))
    }
}

/// Consumer half of a streaming chat request.
pub struct ChatStream {
    session_id: String,
    rx: mpsc::Receiver<ChatEvent>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ChatStream {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Next event, `None` after the terminal event.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        self.rx.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel, drain to the terminal event and join the request task.
    pub async fn cancel_and_drain(&mut self) -> ChatEvent {
        self.cancel();
        let mut terminal = ChatEvent::Cancelled;
        while let Some(event) = self.rx.recv().await {
            if event.is_terminal() {
                terminal = event;
            }
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!("Chat task ended abnormally: {}", e);
            }
        }
        terminal
    }
}

impl Drop for ChatStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Request state carried from retrieval to the final response.
struct Prepared {
    session: OwnedMutexGuard<ChatSession>,
    session_id: String,
    message: String,
    standalone: String,
    query_keywords: Vec<String>,
    rewrite_usage: Option<LlmUsage>,
    retrieved_count: usize,
    documents: Vec<ValidatedDocument>,
    started: Instant,
}

enum Stage {
    Answered(ChatResponse),
    Generate(Box<Prepared>, BuiltPrompt),
}

pub struct ChatService {
    sessions: SessionStore,
    contextualizer: QueryContextualizer,
    retriever: Retriever,
    relevance: RelevanceValidator,
    answer_prompt: PromptDefinition,
    generator: AnswerGenerator,
    validator: ResponseValidator,
    extractor: SourceExtractor,
    cache: Option<Arc<dyn ResponseCache>>,
    max_query_chars: usize,
    stream_buffer: usize,
}

impl ChatService {
    pub fn new(context: ServiceContext) -> Self {
        let ServiceContext {
            llm,
            model,
            store,
            config,
            answer_prompt,
            condense_prompt,
            cache,
        } = context;

        Self {
            sessions: SessionStore::new(config.session.window),
            contextualizer: QueryContextualizer::new(Arc::clone(&llm), model.clone(), condense_prompt),
            retriever: Retriever::new(
                store,
                config.retrieval.top_k,
                config.retrieval.search_strategy(),
            ),
            extractor: SourceExtractor::new(config.relevance.max_reference_sources),
            relevance: RelevanceValidator::new(config.relevance),
            answer_prompt,
            generator: AnswerGenerator::new(llm, model, &config.generation),
            validator: ResponseValidator::new(&config.validation),
            cache,
            max_query_chars: config.input.max_query_chars,
            stream_buffer: config.generation.stream_buffer.max(1),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Answer a message (blocking generation).
    ///
    /// # Errors
    /// `InvalidInput` before any external call; `Retrieval` and `Generation`
    /// when those stages fail. Everything else degrades gracefully.
    pub async fn chat(&self, request: ChatRequest) -> AppResult<ChatResponse> {
        let message = self.check_input(&request.message)?;
        let session_id = session_id_for(&request);
        let span = tracing::info_span!("chat", session_id = %session_id);

        async move {
            match self.prepare(session_id, message, true).await? {
                Stage::Answered(response) => Ok(response),
                Stage::Generate(prepared, prompt) => {
                    let generated = self.generator.generate(&prompt).await.map_err(|e| {
                        tracing::error!("Generation failed: {}", e);
                        e
                    })?;
                    let response = self.finish(*prepared, generated);
                    if let Some(cache) = &self.cache {
                        cache.set(
                            cache_key(&response.metadata.standalone_query),
                            response.answer.clone(),
                        );
                    }
                    Ok(response)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Answer a message, streaming fragments as they are generated.
    ///
    /// Input is validated up front; later failures arrive as a terminal
    /// [`ChatEvent::Error`].
    pub fn chat_stream(self: &Arc<Self>, request: ChatRequest) -> AppResult<ChatStream> {
        let message = self.check_input(&request.message)?;
        let session_id = session_id_for(&request);
        let span = tracing::info_span!("chat", session_id = %session_id, stream = true);

        let (tx, rx) = mpsc::channel(self.stream_buffer);
        let cancel = CancellationToken::new();
        let service = Arc::clone(self);
        let token = cancel.clone();
        let id = session_id.clone();

        let handle = tokio::spawn(
            async move {
                let terminal = service.run_stream(id, message, &tx, &token).await;
                let _ = tx.send(terminal).await;
            }
            .instrument(span),
        );

        Ok(ChatStream {
            session_id,
            rx,
            cancel,
            handle: Some(handle),
        })
    }

    /// Empty a session. Clearing an unknown session is a successful no-op.
    pub async fn clear_session(&self, session_id: &str) -> bool {
        self.sessions.clear(session_id).await
    }

    fn check_input(&self, message: &str) -> AppResult<String> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AppError::InvalidInput("the question is empty".to_string()));
        }
        let chars = message.chars().count();
        if chars > self.max_query_chars {
            return Err(AppError::InvalidInput(format!(
                "the question is {} characters long, the limit is {}",
                chars, self.max_query_chars
            )));
        }
        Ok(message.to_string())
    }

    /// Every stage up to prompt assembly.
    async fn prepare(&self, session_id: String, message: String, use_cache: bool) -> AppResult<Stage> {
        let started = Instant::now();
        let mut session = self.sessions.lock(&session_id).await;
        let history: Vec<ChatTurn> = session.turns().cloned().collect();

        let (standalone, rewrite_usage) = self.contextualizer.contextualize(&message, &history).await;

        if use_cache {
            if let Some(answer) = self.cache.as_ref().and_then(|c| c.get(&cache_key(&standalone))) {
                tracing::info!("Answer served from cache");
                session.record_exchange(message, answer.clone());
                return Ok(Stage::Answered(ChatResponse {
                    answer,
                    session_id,
                    citations: Vec::new(),
                    fallback: false,
                    metadata: ResponseMetadata {
                        token_usage: rewrite_usage.unwrap_or_default(),
                        standalone_query: standalone,
                        cached: true,
                        elapsed_ms: elapsed_ms(started),
                        ..Default::default()
                    },
                }));
            }
        }

        let candidates = self.retriever.retrieve(&standalone).await.map_err(|e| {
            tracing::error!("Retrieval failed: {}", e);
            e
        })?;
        let retrieved_count = candidates.len();
        let query_keywords = self.relevance.query_keywords(&standalone);
        let documents = self.relevance.filter(&standalone, candidates);

        if documents.is_empty() {
            tracing::info!("No document cleared the relevance threshold, answering with fallback");
            session.record_exchange(message, FALLBACK_ANSWER);
            return Ok(Stage::Answered(ChatResponse {
                answer: FALLBACK_ANSWER.to_string(),
                session_id,
                citations: Vec::new(),
                fallback: true,
                metadata: ResponseMetadata {
                    token_usage: rewrite_usage.unwrap_or_default(),
                    documents_filtered: retrieved_count,
                    retrieved_count,
                    standalone_query: standalone,
                    elapsed_ms: elapsed_ms(started),
                    ..Default::default()
                },
            }));
        }

        let prompt = assemble_prompt(&self.answer_prompt, &standalone, &documents, &history)?;

        Ok(Stage::Generate(
            Box::new(Prepared {
                session,
                session_id,
                message,
                standalone,
                query_keywords,
                rewrite_usage,
                retrieved_count,
                documents,
                started,
            }),
            prompt,
        ))
    }

    /// Validate, cite, record the exchange and build the response.
    fn finish(&self, prepared: Prepared, generated: GeneratedAnswer) -> ChatResponse {
        let Prepared {
            mut session,
            session_id,
            message,
            standalone,
            query_keywords,
            rewrite_usage,
            retrieved_count,
            documents,
            started,
        } = prepared;

        let outcome = self
            .validator
            .validate(&generated.text, &query_keywords, &documents);
        let citations = self.extractor.extract(&documents);

        let mut answer = outcome.text.clone();
        if let Some(block) = format_reference_block(&citations) {
            answer.push_str("\n\n");
            answer.push_str(&block);
        }

        session.record_exchange(message, outcome.text);

        let token_usage = match rewrite_usage {
            Some(usage) => usage.combined(generated.token_usage),
            None => generated.token_usage,
        };
        let validated_sources_count = citations.iter().filter(|c| c.has_url).count();

        let metadata = ResponseMetadata {
            token_usage,
            model_id: Some(generated.model_id),
            sources_count: citations.len(),
            validated_sources_count,
            documents_filtered: retrieved_count - documents.len(),
            retrieved_count,
            warnings: outcome.warnings,
            standalone_query: standalone,
            cached: false,
            elapsed_ms: elapsed_ms(started),
        };

        tracing::info!(
            sources = metadata.sources_count,
            warnings = metadata.warnings.len(),
            total_tokens = metadata.token_usage.total_tokens,
            elapsed_ms = metadata.elapsed_ms,
            "Answer ready"
        );

        ChatResponse {
            answer,
            session_id,
            citations,
            fallback: false,
            metadata,
        }
    }

    /// Body of a streaming request; returns the terminal event.
    async fn run_stream(
        &self,
        session_id: String,
        message: String,
        tx: &mpsc::Sender<ChatEvent>,
        cancel: &CancellationToken,
    ) -> ChatEvent {
        let stage = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ChatEvent::Cancelled,
            stage = self.prepare(session_id, message, false) => stage,
        };

        let (prepared, prompt) = match stage {
            Ok(Stage::Answered(response)) => {
                if tx.send(ChatEvent::Fragment(response.answer.clone())).await.is_err() {
                    return ChatEvent::Cancelled;
                }
                return ChatEvent::Done(Box::new(response));
            }
            Ok(Stage::Generate(prepared, prompt)) => (prepared, prompt),
            Err(e) => {
                tracing::error!("Streaming request failed: {}", e);
                return ChatEvent::Error(e.user_message());
            }
        };

        let mut answer_stream = self.generator.generate_stream(&prompt);
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    answer_stream.cancel_and_drain().await;
                    return ChatEvent::Cancelled;
                }
                event = answer_stream.next_event() => event,
            };

            match event {
                Some(StreamEvent::Fragment(text)) => {
                    if tx.send(ChatEvent::Fragment(text)).await.is_err() {
                        answer_stream.cancel_and_drain().await;
                        return ChatEvent::Cancelled;
                    }
                }
                Some(StreamEvent::Done(generated)) => {
                    let response = self.finish(*prepared, generated);
                    if let Some(block) = format_reference_block(&response.citations) {
                        let _ = tx.send(ChatEvent::Fragment(format!("\n\n{}", block))).await;
                    }
                    return ChatEvent::Done(Box::new(response));
                }
                Some(StreamEvent::Error(message)) => {
                    return ChatEvent::Error(AppError::Generation(message).user_message());
                }
                Some(StreamEvent::Cancelled) | None => return ChatEvent::Cancelled,
            }
        }
    }
}

fn session_id_for(request: &ChatRequest) -> String {
    request
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
