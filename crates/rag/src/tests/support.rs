//! In-process collaborators for pipeline tests.

use async_trait::async_trait;
use futures::StreamExt;
use questline_core::{AppError, AppResult};
use questline_llm::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::retriever::{SearchHit, SearchParams, VectorStore};
use crate::service::{ChatService, ServiceContext};
use crate::types::{Document, DocumentMetadata};

/// Generator stub: answers with fixed text, echoes follow-ups back as their
/// own standalone form, and streams the answer in word-sized pieces.
pub struct StubLlm {
    pub answer: String,
    pub delay: Duration,
    pub fail: bool,
    /// Fail the stream after this many pieces.
    pub stream_fail_after: Option<usize>,
    pub complete_calls: AtomicUsize,
    pub stream_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl StubLlm {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            delay: Duration::ZERO,
            fail: false,
            stream_fail_after: None,
            complete_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn failing_stream_after(mut self, pieces: usize) -> Self {
        self.stream_fail_after = Some(pieces);
        self
    }

    pub fn calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst) + self.stream_calls.load(Ordering::SeqCst)
    }

    /// Answer split after every space, so the pieces concatenate back.
    pub fn pieces(&self) -> Vec<String> {
        self.answer
            .split_inclusive(' ')
            .map(str::to_string)
            .collect()
    }

    fn is_condense(request: &LlmRequest) -> bool {
        request.prompt.contains("# Follow-up message")
    }
}

#[async_trait]
impl LlmClient for StubLlm {
    fn provider_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if Self::is_condense(request) {
            let follow_up = request
                .prompt
                .split("# Follow-up message\n")
                .nth(1)
                .and_then(|rest| rest.lines().next())
                .unwrap_or_default();
            return Ok(LlmResponse {
                content: follow_up.to_string(),
                model: request.model.clone(),
                usage: LlmUsage::new(30, 10),
            });
        }

        if self.fail {
            return Err(AppError::Llm("upstream returned 529 overloaded".to_string()));
        }

        Ok(LlmResponse {
            content: self.answer.clone(),
            model: request.model.clone(),
            usage: LlmUsage::new(400, 40),
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::Llm("upstream returned 529 overloaded".to_string()));
        }

        let model = request.model.clone();
        let mut items: Vec<AppResult<LlmStreamChunk>> = self
            .pieces()
            .into_iter()
            .map(|piece| Ok(LlmStreamChunk::fragment(piece, model.clone())))
            .collect();
        match self.stream_fail_after {
            Some(n) => {
                items.truncate(n);
                items.push(Err(AppError::Llm("connection reset by peer".to_string())));
            }
            None => items.push(Ok(LlmStreamChunk::finished(model, LlmUsage::new(400, 40)))),
        }

        let delay = self.delay;
        let stream = futures::stream::iter(items).then(move |item| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            item
        });
        Ok(Box::pin(stream))
    }
}

/// Vector store stub returning fixed documents in order.
pub struct StubStore {
    pub documents: Vec<Document>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl StubStore {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            documents: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStore for StubStore {
    fn name(&self) -> &str {
        "stub"
    }

    async fn search(&self, _query: &str, params: SearchParams) -> AppResult<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::Retrieval("connection refused (localhost:6333)".to_string()));
        }
        Ok(self
            .documents
            .iter()
            .take(params.limit)
            .cloned()
            .map(|document| SearchHit {
                document,
                vector: None,
            })
            .collect())
    }
}

pub fn doc(source: &str, title: &str, content: &str, url: Option<&str>) -> Document {
    Document::new(format!("{}#0", source), content)
        .with_metadata(DocumentMetadata {
            title: Some(title.to_string()),
            source: Some(source.to_string()),
            url: url.map(str::to_string),
            ..Default::default()
        })
        .with_similarity(0.8)
}

pub fn cube_doc() -> Document {
    doc(
        "items/red_cube.md",
        "Red Cube Guide",
        "The Red Cube costs 1,200 points in the cash shop. How much you need depends on luck.",
        Some("https://maplestory.nexon.net/guides/red-cube"),
    )
}

pub fn fishing_doc() -> Document {
    doc("life/fishing.md", "Fishing", "Cast the rod near the river.", None)
}

pub const CUBE_QUESTION: &str = "How much does a red cube cost?";

pub fn service_with(llm: Arc<StubLlm>, store: Arc<StubStore>, config: PipelineConfig) -> Arc<ChatService> {
    Arc::new(ChatService::new(ServiceContext::new(llm, "stub-model", store, config)))
}

pub fn service(llm: Arc<StubLlm>, store: Arc<StubStore>) -> Arc<ChatService> {
    service_with(llm, store, PipelineConfig::default())
}
