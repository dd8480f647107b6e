//! Pipeline data types.

use chrono::{DateTime, Utc};
use questline_llm::LlmUsage;
use serde::{Deserialize, Serialize};

/// One structured citation declared by a document's front matter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
}

/// Document metadata written by ingestion.
///
/// Unknown payload keys are ignored; every field is optional so that
/// partially-tagged chunks still deserialize.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,

    /// Originating file, used as the citation dedup key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, alias = "chunkIndex")]
    pub chunk_index: u32,

    /// Character class / job the document is about.
    #[serde(
        rename = "class",
        alias = "class_name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub class_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceEntry>,
}

impl DocumentMetadata {
    /// Every textual metadata value, for verbatim claim checks.
    pub fn text_values(&self) -> Vec<&str> {
        let scalars = [
            &self.title,
            &self.category,
            &self.author,
            &self.section,
            &self.url,
            &self.creator,
            &self.source,
            &self.class_name,
        ];
        let entries = self
            .sources
            .iter()
            .flat_map(|entry| [&entry.url, &entry.title, &entry.creator]);

        scalars
            .into_iter()
            .chain(entries)
            .filter_map(|value| value.as_deref())
            .collect()
    }
}

/// A retrieved knowledge-base chunk. Immutable once retrieved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    /// Native score reported by the vector store.
    #[serde(default)]
    pub similarity_score: f32,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: DocumentMetadata::default(),
            similarity_score: 0.0,
        }
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_similarity(mut self, score: f32) -> Self {
        self.similarity_score = score;
        self
    }

    /// Identity of the originating source: metadata `source`, else the id.
    pub fn source_id(&self) -> &str {
        self.metadata.source.as_deref().unwrap_or(&self.id)
    }
}

/// A document that passed relevance filtering, with its score in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedDocument {
    pub document: Document,
    pub relevance: f32,
}

/// A reference back to an originating document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub has_url: bool,
    pub relevance_score: f32,
    pub source_id: String,
    pub chunk_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Output of one generation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedAnswer {
    pub text: String,
    pub token_usage: LlmUsage,
    pub model_id: String,
}

/// Non-fatal findings of answer validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    /// A number not found verbatim in any validated document.
    UnverifiedQuantity { text: String },
    /// A currency / point / coin amount not found in the documents.
    UnverifiedAmount { text: String },
    /// An item or skill name not found in the documents.
    UnverifiedName { text: String },
    /// A hedging phrase that was stripped from the answer.
    HedgeRemoved { text: String },
    /// The answer shares no keyword with the query.
    NoKeywordOverlap,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationWarning::UnverifiedQuantity { text } => {
                write!(f, "unverified quantity '{}'", text)
            }
            ValidationWarning::UnverifiedAmount { text } => write!(f, "unverified amount '{}'", text),
            ValidationWarning::UnverifiedName { text } => write!(f, "unverified name '{}'", text),
            ValidationWarning::HedgeRemoved { text } => write!(f, "hedge removed '{}'", text),
            ValidationWarning::NoKeywordOverlap => write!(f, "answer shares no keyword with query"),
        }
    }
}

/// A chat request from the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Observability data attached to every response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResponseMetadata {
    pub token_usage: LlmUsage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Citations extracted from the validated documents.
    pub sources_count: usize,
    /// Citations that carry any URL. The reference block lists only the
    /// displayable (http, https, www) subset of these.
    pub validated_sources_count: usize,
    /// Candidates dropped by relevance filtering.
    pub documents_filtered: usize,
    pub retrieved_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ValidationWarning>,
    pub standalone_query: String,
    pub cached: bool,
    pub elapsed_ms: u64,
}

/// The pipeline's answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    /// Final answer text, including the reference block when one applies.
    pub answer: String,
    pub session_id: String,
    pub citations: Vec<Citation>,
    /// Set when no document cleared the relevance threshold.
    pub fallback: bool,
    pub metadata: ResponseMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_from_ingestion_payload() {
        let metadata: DocumentMetadata = serde_json::from_value(serde_json::json!({
            "title": "Hard Lucid",
            "class": "Bishop",
            "chunk_index": 3,
            "source": "bosses/lucid.md",
            "ingested_by": "etl",
            "sources": [{"url": "https://a.example", "creator": "X"}]
        }))
        .unwrap();

        assert_eq!(metadata.class_name.as_deref(), Some("Bishop"));
        assert_eq!(metadata.chunk_index, 3);
        assert_eq!(metadata.sources[0].creator.as_deref(), Some("X"));
        assert!(metadata.text_values().contains(&"https://a.example"));
    }

    #[test]
    fn test_source_id_falls_back_to_id() {
        let doc = Document::new("chunk-1", "text");
        assert_eq!(doc.source_id(), "chunk-1");

        let doc = doc.with_metadata(DocumentMetadata {
            source: Some("guide.md".to_string()),
            ..Default::default()
        });
        assert_eq!(doc.source_id(), "guide.md");
    }

    #[test]
    fn test_warning_serialization() {
        let json = serde_json::to_value(ValidationWarning::HedgeRemoved {
            text: "approximately".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "hedge_removed");
        assert_eq!(json["text"], "approximately");
    }
}
