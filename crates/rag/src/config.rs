//! Pipeline configuration.
//!
//! Loaded from `.questline/pipeline.yaml`; every field has a default so the
//! file may be partial or absent.

use questline_core::config::WORKSPACE_DIR;
use questline_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::retriever::SearchStrategy;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub retrieval: RetrievalConfig,
    pub relevance: RelevanceConfig,
    pub validation: ValidationConfig,
    pub generation: GenerationConfig,
    pub session: SessionConfig,
    pub input: InputConfig,
    pub cache: CacheConfig,
    pub vector_store: VectorStoreConfig,
    pub embedding: EmbeddingConfig,
    pub prompts: PromptsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Similarity,
    SimilarityScoreThreshold,
    Mmr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub strategy: StrategyKind,
    pub top_k: usize,
    /// Minimum store score for `similarity_score_threshold`.
    pub score_threshold: f32,
    /// MMR candidate pool is `top_k * fetch_multiplier`.
    pub fetch_multiplier: usize,
    /// MMR trade-off: 1.0 is pure relevance, 0.0 pure diversity.
    pub lambda: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Similarity,
            top_k: 5,
            score_threshold: 0.75,
            fetch_multiplier: 4,
            lambda: 0.5,
        }
    }
}

impl RetrievalConfig {
    pub fn search_strategy(&self) -> SearchStrategy {
        match self.strategy {
            StrategyKind::Similarity => SearchStrategy::Similarity,
            StrategyKind::SimilarityScoreThreshold => SearchStrategy::SimilarityScoreThreshold {
                score_threshold: self.score_threshold,
            },
            StrategyKind::Mmr => SearchStrategy::Mmr {
                fetch_multiplier: self.fetch_multiplier,
                lambda: self.lambda,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevanceWeights {
    pub title: f32,
    pub content: f32,
    pub title_similarity: f32,
    pub title_keywords: f32,
    pub class_bonus: f32,
    pub category_bonus: f32,
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        Self {
            title: 0.4,
            content: 0.4,
            title_similarity: 0.7,
            title_keywords: 0.3,
            class_bonus: 0.3,
            category_bonus: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevanceConfig {
    /// When false, candidates are only truncated.
    pub enabled: bool,
    pub threshold: f32,
    pub max_reference_sources: usize,
    pub max_keywords: usize,
    pub weights: RelevanceWeights,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.3,
            max_reference_sources: 3,
            max_keywords: 10,
            weights: RelevanceWeights::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub enabled: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Capacity of the fragment channel between producer and consumer.
    pub stream_buffer: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 4096,
            stream_buffer: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Round trips retained per session.
    pub window: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { window: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub max_query_chars: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            max_query_chars: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: 3600,
            max_entries: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub url: String,
    pub collection: String,
    /// Environment variable holding the store API key, if any.
    pub api_key_env: Option<String>,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            collection: "questline_docs".to_string(),
            api_key_env: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub answer: String,
    pub condense: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            answer: questline_prompt::ANSWER_PROMPT_ID.to_string(),
            condense: questline_prompt::CONDENSE_PROMPT_ID.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Reject settings that would break pipeline invariants.
    pub fn validate(&self) -> AppResult<()> {
        if self.retrieval.top_k == 0 {
            return Err(AppError::Config("retrieval.top_k must be at least 1".to_string()));
        }
        if self.retrieval.fetch_multiplier == 0 {
            return Err(AppError::Config(
                "retrieval.fetch_multiplier must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.lambda) {
            return Err(AppError::Config(format!(
                "retrieval.lambda must be within [0, 1], got {}",
                self.retrieval.lambda
            )));
        }
        if !(0.0..=1.0).contains(&self.relevance.threshold) {
            return Err(AppError::Config(format!(
                "relevance.threshold must be within [0, 1], got {}",
                self.relevance.threshold
            )));
        }
        if self.relevance.max_reference_sources == 0 {
            return Err(AppError::Config(
                "relevance.max_reference_sources must be at least 1".to_string(),
            ));
        }
        if self.session.window == 0 {
            return Err(AppError::Config("session.window must be at least 1".to_string()));
        }
        if self.generation.stream_buffer == 0 {
            return Err(AppError::Config(
                "generation.stream_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load the pipeline configuration for a workspace.
///
/// Uses defaults when `.questline/pipeline.yaml` does not exist.
pub fn load_pipeline_config(workspace: &Path) -> AppResult<PipelineConfig> {
    let config_path = pipeline_config_path(workspace);

    if !config_path.exists() {
        tracing::debug!("No pipeline config at {:?}, using defaults", config_path);
        return Ok(PipelineConfig::default());
    }

    let content = fs::read_to_string(&config_path).map_err(|e| {
        AppError::Config(format!("Failed to read config at {:?}: {}", config_path, e))
    })?;

    let config: PipelineConfig = serde_yaml::from_str(&content).map_err(|e| {
        AppError::Config(format!("Failed to parse config at {:?}: {}", config_path, e))
    })?;
    config.validate()?;

    tracing::debug!("Loaded pipeline config from {:?}", config_path);
    Ok(config)
}

/// Get the path to the pipeline config file.
pub fn pipeline_config_path(workspace: &Path) -> PathBuf {
    workspace.join(WORKSPACE_DIR).join("pipeline.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_default_config() {
        let temp = TempDir::new().unwrap();
        let config = load_pipeline_config(temp.path()).unwrap();

        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.relevance.max_reference_sources, 3);
        assert_eq!(config.session.window, 5);
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = pipeline_config_path(temp.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            "retrieval:\n  strategy: mmr\n  lambda: 0.7\nrelevance:\n  threshold: 0.5\n",
        )
        .unwrap();

        let config = load_pipeline_config(temp.path()).unwrap();
        assert_eq!(
            config.retrieval.search_strategy(),
            SearchStrategy::Mmr {
                fetch_multiplier: 4,
                lambda: 0.7
            }
        );
        assert_eq!(config.relevance.threshold, 0.5);
        assert_eq!(config.relevance.weights.class_bonus, 0.3);
        assert_eq!(config.generation.max_tokens, 4096);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let temp = TempDir::new().unwrap();
        let path = pipeline_config_path(temp.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "relevance:\n  max_reference_sources: 0\n").unwrap();

        assert!(load_pipeline_config(temp.path()).is_err());
    }
}
