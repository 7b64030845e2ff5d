use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::RagError;

/// Endpoint and model identifiers for the embedding/completion provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible server.
    pub base_url: String,
    /// Model id used for chat completions.
    pub chat_model: String,
    /// Model id used for embeddings.
    pub embedding_model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: i32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1234".to_string(),
            chat_model: "qwen2.5-7b-instruct".to_string(),
            embedding_model: "nomic-embed-text-v1.5".to_string(),
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 1024,
        }
    }
}

/// Configuration for the ingestion and query pipelines.
///
/// All values have documented defaults; nothing is read from the environment
/// inside the pipelines themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Characters of shared text between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per chat turn.
    pub retrieval_top_k: usize,
    /// Maximum prior messages included in the completion request.
    pub history_window: usize,
    /// Vector dimension; must match the vector store collection.
    pub embedding_dimension: usize,
    /// Upper bound for generated and fallback chat titles.
    pub title_max_len: usize,
    pub provider: ProviderConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            retrieval_top_k: 5,
            history_window: 20,
            embedding_dimension: 768,
            title_max_len: 80,
            provider: ProviderConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, falling back to defaults for any
    /// missing field. A missing file is not an error; defaults apply.
    pub fn load(path: &Path) -> Result<Self, RagError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(RagError::internal)?;
        let config: AppConfig = toml::from_str(&raw)
            .map_err(|e| RagError::Validation(format!("invalid config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RagError> {
        if self.chunk_size == 0 {
            return Err(RagError::Validation("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Validation(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.retrieval_top_k == 0 {
            return Err(RagError::Validation(
                "retrieval_top_k must be positive".into(),
            ));
        }
        if self.embedding_dimension == 0 {
            return Err(RagError::Validation(
                "embedding_dimension must be positive".into(),
            ));
        }
        if self.provider.chat_model.trim().is_empty()
            || self.provider.embedding_model.trim().is_empty()
        {
            return Err(RagError::Validation(
                "provider model identifiers must not be empty".into(),
            ));
        }
        Ok(())
    }
}
