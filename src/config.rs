use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Result, WikiqaError};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub source: SourceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    pub max_chars: usize,
    /// Characters carried over from the tail of one chunk into the next.
    #[serde(default = "default_overlap")]
    pub overlap_chars: usize,
}

fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Final number of chunks handed to the generator.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Candidates fetched from the index before per-document capping.
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    /// Maximum chunks from one document in the final result.
    #[serde(default = "default_per_document_cap")]
    pub per_document_cap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            candidate_k: default_candidate_k(),
            per_document_cap: default_per_document_cap(),
        }
    }
}

fn default_top_k() -> usize {
    6
}
fn default_candidate_k() -> usize {
    32
}
fn default_per_document_cap() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// "openai" or "ollama".
    pub provider: String,
    pub model: String,
    pub dims: usize,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Embedding batches allowed in flight at once during ingestion.
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,
}

fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    4
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_concurrent_batches() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// "openai" or "ollama".
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_gen_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_gen_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Directory holding the exported PDFs.
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Documents processed concurrently during ingestion.
    #[serde(default = "default_max_concurrent_documents")]
    pub max_concurrent_documents: usize,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string()]
}

fn default_max_concurrent_documents() -> usize {
    4
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        WikiqaError::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| WikiqaError::Config(format!("failed to parse config file: {}", e)))?;

    validate(&config)?;
    Ok(config)
}

/// Startup validation. Anything rejected here is fatal before any work runs.
pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_chars == 0 {
        return Err(WikiqaError::Config("chunking.max_chars must be > 0".into()));
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        return Err(WikiqaError::Config(format!(
            "chunking.overlap_chars ({}) must be strictly less than chunking.max_chars ({})",
            config.chunking.overlap_chars, config.chunking.max_chars
        )));
    }

    if config.retrieval.top_k == 0 {
        return Err(WikiqaError::Config("retrieval.top_k must be >= 1".into()));
    }
    if config.retrieval.candidate_k < config.retrieval.top_k {
        return Err(WikiqaError::Config(format!(
            "retrieval.candidate_k ({}) must be >= retrieval.top_k ({})",
            config.retrieval.candidate_k, config.retrieval.top_k
        )));
    }
    if config.retrieval.per_document_cap == 0 {
        return Err(WikiqaError::Config(
            "retrieval.per_document_cap must be >= 1".into(),
        ));
    }

    if config.embedding.dims == 0 {
        return Err(WikiqaError::Config("embedding.dims must be > 0".into()));
    }
    if config.embedding.batch_size == 0 {
        return Err(WikiqaError::Config("embedding.batch_size must be > 0".into()));
    }
    if config.embedding.max_concurrent_batches == 0 {
        return Err(WikiqaError::Config(
            "embedding.max_concurrent_batches must be > 0".into(),
        ));
    }
    match config.embedding.provider.as_str() {
        "openai" | "ollama" => {}
        other => {
            return Err(WikiqaError::Config(format!(
                "unknown embedding provider: '{}'. Must be openai or ollama.",
                other
            )))
        }
    }

    match config.generation.provider.as_str() {
        "openai" | "ollama" => {}
        other => {
            return Err(WikiqaError::Config(format!(
                "unknown generation provider: '{}'. Must be openai or ollama.",
                other
            )))
        }
    }

    if config.source.max_concurrent_documents == 0 {
        return Err(WikiqaError::Config(
            "source.max_concurrent_documents must be > 0".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        toml::from_str(
            r#"
            [db]
            path = "/tmp/wikiqa.sqlite"

            [chunking]
            max_chars = 500
            overlap_chars = 50

            [embedding]
            provider = "openai"
            model = "text-embedding-3-small"
            dims = 1536

            [generation]
            provider = "openai"
            model = "gpt-4o-mini"

            [source]
            root = "/tmp/exports"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn overlap_equal_to_max_rejected() {
        let mut config = base_config();
        config.chunking.overlap_chars = config.chunking.max_chars;
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, WikiqaError::Config(_)));
        assert!(err.to_string().contains("strictly less"));
    }

    #[test]
    fn overlap_above_max_rejected() {
        let mut config = base_config();
        config.chunking.overlap_chars = config.chunking.max_chars + 1;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn candidate_k_below_top_k_rejected() {
        let mut config = base_config();
        config.retrieval.top_k = 10;
        config.retrieval.candidate_k = 5;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        let mut config = base_config();
        config.embedding.provider = "mystery".into();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn defaults_applied() {
        let config = base_config();
        assert_eq!(config.retrieval.top_k, 6);
        assert_eq!(config.retrieval.per_document_cap, 2);
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.source.include_globs, vec!["**/*.pdf".to_string()]);
    }
}
