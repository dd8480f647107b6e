//! Relevance scoring and filtering of retrieved candidates.
//!
//! Raw vector similarity is noisy for short queries and game jargon, so
//! every candidate is re-scored against the query's keywords:
//!
//! ```text
//! title    = w.title_similarity * similarity(title, query)
//!          + w.title_keywords   * overlap(title keywords, query keywords)
//! content  = matched query keywords / max(|query keywords|, 1)
//! bonus    = w.class_bonus    if a keyword occurs in the class field
//!          + w.category_bonus if a keyword occurs in the category field
//! final    = clamp(w.title * title + w.content * content + bonus, 0, 1)
//! ```

use crate::config::RelevanceConfig;
use crate::keywords::{extract_keywords, keyword_overlap, matched_keywords, string_similarity};
use crate::types::{Document, ValidatedDocument};

/// Scores, filters and ranks candidate documents.
#[derive(Debug, Clone)]
pub struct RelevanceValidator {
    config: RelevanceConfig,
}

impl RelevanceValidator {
    pub fn new(config: RelevanceConfig) -> Self {
        Self { config }
    }

    /// Query keywords as used for scoring.
    pub fn query_keywords(&self, query: &str) -> Vec<String> {
        extract_keywords(query, self.config.max_keywords)
    }

    /// Relevance of one document to the query, in [0, 1].
    pub fn score(&self, document: &Document, query: &str, query_keywords: &[String]) -> f32 {
        let weights = &self.config.weights;
        let query_lower = query.to_lowercase();
        let keyword_count = query_keywords.len().max(1) as f32;

        let title = document
            .metadata
            .title
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();
        let title_keywords = extract_keywords(&title, self.config.max_keywords);
        let title_relevance = weights.title_similarity * string_similarity(&title, &query_lower)
            + weights.title_keywords * keyword_overlap(&title_keywords, query_keywords);

        let content_lower = document.content.to_lowercase();
        let content_relevance = matched_keywords(&content_lower, query_keywords) as f32 / keyword_count;

        let mut bonus = 0.0;
        if field_mentions(document.metadata.class_name.as_deref(), query_keywords) {
            bonus += weights.class_bonus;
        }
        if field_mentions(document.metadata.category.as_deref(), query_keywords) {
            bonus += weights.category_bonus;
        }

        let raw = weights.title * title_relevance + weights.content * content_relevance + bonus;

        tracing::debug!(
            document_id = %document.id,
            title_relevance,
            content_relevance,
            bonus,
            raw,
            "Scored candidate"
        );

        raw.clamp(0.0, 1.0)
    }

    /// Keep candidates at or above the threshold, best first, truncated to
    /// `max_reference_sources`.
    ///
    /// With filtering disabled the candidates are only truncated, keeping
    /// the store's order and (clamped) similarity as the score.
    pub fn filter(&self, query: &str, candidates: Vec<Document>) -> Vec<ValidatedDocument> {
        let limit = self.config.max_reference_sources;

        if !self.config.enabled {
            tracing::debug!("Relevance filtering disabled, truncating to {}", limit);
            return candidates
                .into_iter()
                .take(limit)
                .map(|document| {
                    let relevance = document.similarity_score.clamp(0.0, 1.0);
                    ValidatedDocument {
                        document,
                        relevance,
                    }
                })
                .collect();
        }

        let query_keywords = self.query_keywords(query);
        tracing::debug!(?query_keywords, "Extracted query keywords");

        let candidate_count = candidates.len();
        let mut kept: Vec<ValidatedDocument> = candidates
            .into_iter()
            .filter_map(|document| {
                let relevance = self.score(&document, query, &query_keywords);
                (relevance >= self.config.threshold).then_some(ValidatedDocument {
                    document,
                    relevance,
                })
            })
            .collect();

        kept.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        kept.truncate(limit);

        tracing::info!(
            "Relevance filter kept {} of {} candidates (threshold {:.2})",
            kept.len(),
            candidate_count,
            self.config.threshold
        );

        kept
    }
}

fn field_mentions(field: Option<&str>, keywords: &[String]) -> bool {
    match field {
        Some(value) => {
            let value = value.to_lowercase();
            keywords.iter().any(|keyword| value.contains(keyword.as_str()))
        }
        None => false,
    }
}
