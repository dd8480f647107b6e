//! Retrieval-augmented answer pipeline.
//!
//! Answers player questions from a curated knowledge base: follow-up
//! rewriting, vector retrieval, relevance filtering, grounded generation
//! (blocking or streaming), answer validation and citation extraction.

pub mod assembler;
pub mod cache;
pub mod citations;
pub mod config;
pub mod contextualizer;
pub mod embeddings;
pub mod generator;
pub mod keywords;
pub mod relevance;
pub mod retriever;
pub mod service;
pub mod session;
pub mod types;
pub mod validator;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use cache::{cache_key, MemoryResponseCache, ResponseCache};
pub use citations::{format_reference_block, parse_front_matter_sources, SourceExtractor};
pub use config::{load_pipeline_config, PipelineConfig};
pub use generator::{AnswerGenerator, AnswerStream, StreamEvent};
pub use retriever::{QdrantStore, Retriever, SearchHit, SearchParams, SearchStrategy, VectorStore};
pub use service::{ChatEvent, ChatService, ChatStream, ServiceContext, FALLBACK_ANSWER};
pub use session::{ChatSession, SessionStore};
pub use types::{
    ChatRequest, ChatResponse, ChatTurn, Citation, Document, DocumentMetadata, GeneratedAnswer,
    ResponseMetadata, Role, SourceEntry, ValidatedDocument, ValidationWarning,
};
