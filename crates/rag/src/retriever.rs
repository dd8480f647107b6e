//! Candidate retrieval from the vector store.
//!
//! The retriever applies the configured search strategy on top of a
//! [`VectorStore`]. It makes no relevance judgement of its own; that is
//! [`crate::relevance`]'s job.

use async_trait::async_trait;
use questline_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::VectorStoreConfig;
use crate::embeddings::EmbeddingProvider;
use crate::types::{Document, DocumentMetadata};

/// How candidates are selected from the store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchStrategy {
    /// Plain top-k by similarity.
    Similarity,
    /// Top-k, dropping anything scored below the cutoff.
    SimilarityScoreThreshold { score_threshold: f32 },
    /// Maximal marginal relevance over `k * fetch_multiplier` candidates.
    Mmr { fetch_multiplier: usize, lambda: f32 },
}

/// Parameters for one store query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub limit: usize,
    pub score_threshold: Option<f32>,
    /// Return stored vectors (needed for MMR).
    pub with_vectors: bool,
}

/// A store result with its stored vector, when requested.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub document: Document,
    pub vector: Option<Vec<f32>>,
}

/// Similarity search capability.
///
/// Hits are ordered by descending score; `document.similarity_score`
/// carries the store's native score.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, params: SearchParams) -> AppResult<Vec<SearchHit>>;
}

/// Applies a [`SearchStrategy`] to a store.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    top_k: usize,
    strategy: SearchStrategy,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, top_k: usize, strategy: SearchStrategy) -> Self {
        Self {
            store,
            top_k: top_k.max(1),
            strategy,
        }
    }

    /// Fetch candidates for a query.
    ///
    /// # Errors
    /// `AppError::Retrieval` for any store failure; there is no fallback.
    pub async fn retrieve(&self, query: &str) -> AppResult<Vec<Document>> {
        tracing::debug!(store = self.store.name(), strategy = ?self.strategy, top_k = self.top_k, "Retrieving candidates");

        let documents = match self.strategy {
            SearchStrategy::Similarity => {
                let hits = self.search(query, self.top_k, None, false).await?;
                hits.into_iter().map(|hit| hit.document).collect()
            }
            SearchStrategy::SimilarityScoreThreshold { score_threshold } => {
                let hits = self
                    .search(query, self.top_k, Some(score_threshold), false)
                    .await?;
                hits.into_iter()
                    .map(|hit| hit.document)
                    .filter(|doc| doc.similarity_score >= score_threshold)
                    .collect()
            }
            SearchStrategy::Mmr {
                fetch_multiplier,
                lambda,
            } => {
                let fetch_k = self.top_k * fetch_multiplier.max(1);
                let hits = self.search(query, fetch_k, None, true).await?;
                mmr_select(hits, self.top_k, lambda)
            }
        };

        tracing::info!("Retrieved {} candidates", documents.len());
        Ok(documents)
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        score_threshold: Option<f32>,
        with_vectors: bool,
    ) -> AppResult<Vec<SearchHit>> {
        let params = SearchParams {
            limit,
            score_threshold,
            with_vectors,
        };

        self.store.search(query, params).await.map_err(|e| match e {
            AppError::Retrieval(_) => e,
            other => AppError::Retrieval(other.to_string()),
        })
    }
}

/// Greedy maximal-marginal-relevance selection.
///
/// Each step picks the hit maximising
/// `lambda * score - (1 - lambda) * max cosine(hit, already selected)`.
/// Hits without a vector are treated as non-redundant.
pub fn mmr_select(hits: Vec<SearchHit>, k: usize, lambda: f32) -> Vec<Document> {
    let mut remaining = hits;
    let mut selected: Vec<SearchHit> = Vec::with_capacity(k.min(remaining.len()));

    while selected.len() < k && !remaining.is_empty() {
        let mut best_index = 0;
        let mut best_value = f32::NEG_INFINITY;

        for (index, candidate) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .filter_map(|chosen| match (&candidate.vector, &chosen.vector) {
                    (Some(a), Some(b)) => Some(cosine_similarity(a, b)),
                    _ => None,
                })
                .fold(0.0_f32, f32::max);

            let value =
                lambda * candidate.document.similarity_score - (1.0 - lambda) * redundancy;
            if value > best_value {
                best_value = value;
                best_index = index;
            }
        }

        selected.push(remaining.remove(best_index));
    }

    selected.into_iter().map(|hit| hit.document).collect()
}

/// Cosine similarity between two vectors; 0.0 on length mismatch or zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ---------------------------------------------------------------------------
// Qdrant
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct QdrantSearchRequest {
    vector: Vec<f32>,
    limit: usize,
    with_payload: bool,
    with_vector: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    score_threshold: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct QdrantSearchResponse {
    #[serde(default)]
    result: Vec<QdrantPoint>,
}

#[derive(Debug, Deserialize)]
struct QdrantPoint {
    id: serde_json::Value,
    score: f32,
    #[serde(default)]
    payload: Option<QdrantPayload>,
    #[serde(default)]
    vector: Option<Vec<f32>>,
}

/// Point payload as written by ingestion.
#[derive(Debug, Default, Deserialize)]
struct QdrantPayload {
    #[serde(default)]
    page_content: String,
    #[serde(default)]
    metadata: DocumentMetadata,
}

impl QdrantPoint {
    fn into_hit(self) -> SearchHit {
        let id = match self.id {
            serde_json::Value::String(id) => id,
            other => other.to_string(),
        };
        let payload = self.payload.unwrap_or_default();

        SearchHit {
            document: Document {
                id,
                content: payload.page_content,
                metadata: payload.metadata,
                similarity_score: self.score,
            },
            vector: self.vector,
        }
    }
}

/// Qdrant collection queried over its REST API.
pub struct QdrantStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    api_key: Option<String>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl QdrantStore {
    pub fn new(config: &VectorStoreConfig, embedder: Arc<dyn EmbeddingProvider>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Retrieval(format!("Failed to create HTTP client: {}", e)))?;

        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok());

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            api_key,
            embedder,
        })
    }

    fn search_url(&self) -> String {
        format!(
            "{}/collections/{}/points/search",
            self.base_url, self.collection
        )
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn name(&self) -> &str {
        "qdrant"
    }

    async fn search(&self, query: &str, params: SearchParams) -> AppResult<Vec<SearchHit>> {
        let vector = self.embedder.embed(query).await?;

        let body = QdrantSearchRequest {
            vector,
            limit: params.limit,
            with_payload: true,
            with_vector: params.with_vectors,
            score_threshold: params.score_threshold,
        };

        let mut request = self.client.post(self.search_url()).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.header("api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Retrieval(format!("Failed to reach Qdrant: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Retrieval(format!(
                "Qdrant search error ({}): {}",
                status, error_text
            )));
        }

        let parsed: QdrantSearchResponse = response
            .json()
            .await
            .map_err(|e| AppError::Retrieval(format!("Failed to parse Qdrant response: {}", e)))?;

        Ok(parsed.result.into_iter().map(QdrantPoint::into_hit).collect())
    }
}
