use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// Staging filesystem layout: the inbox and its `processed/` archive.
#[derive(Debug, Deserialize, Clone)]
pub struct StagingConfig {
    #[serde(default = "default_staging_root")]
    pub root: PathBuf,
    #[serde(default = "default_processed_dir")]
    pub processed_dir: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            root: default_staging_root(),
            processed_dir: default_processed_dir(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_staging_root() -> PathBuf {
    PathBuf::from("data")
}
fn default_processed_dir() -> String {
    "processed".to_string()
}
fn default_include_globs() -> Vec<String> {
    vec![
        "*.pdf".to_string(),
        "*.docx".to_string(),
        "*.txt".to_string(),
        "*.md".to_string(),
    ]
}

impl StagingConfig {
    pub fn processed_path(&self) -> PathBuf {
        self.root.join(&self.processed_dir)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Chunk window in characters. 1000 chars is about 250 words.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlap between consecutive chunks, so a sentence is never lost
    /// at a boundary.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Model name; defaults to all-minilm-l6-v2 when unset.
    #[serde(default)]
    pub model: Option<String>,
    /// Vector dimensionality; inferred from the model name when unset.
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    50
}

/// Remote vector index connection. The index is provisioned out of band
/// with a fixed name and dimension; `dims` here must match it.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Index endpoint, e.g. `https://my-index-abc123.svc.pinecone.io`.
    pub host: String,
    pub name: String,
    pub dims: usize,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// API base URL override; defaults to the Google Generative Language API.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_llm_model() -> String {
    "gemini-2.0-flash".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Context window budget in characters across all retrieved chunks.
    #[serde(default = "default_context_budget")]
    pub context_budget: usize,
    /// How many prior conversation turns accompany each generation request.
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            context_budget: default_context_budget(),
            history_depth: default_history_depth(),
        }
    }
}

fn default_top_k() -> usize {
    6
}
fn default_context_budget() -> usize {
    6000
}
fn default_history_depth() -> usize {
    6
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 || config.chunking.overlap == 0 {
        anyhow::bail!("chunking.chunk_size and chunking.overlap must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be < chunking.chunk_size");
    }

    // Validate index
    if config.index.dims == 0 {
        anyhow::bail!("index.dims must be > 0");
    }
    if config.index.host.trim().is_empty() {
        anyhow::bail!("index.host must be set");
    }

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.context_budget == 0 {
        anyhow::bail!("retrieval.context_budget must be > 0");
    }

    match config.embedding.provider.as_str() {
        "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be local.",
            other
        ),
    }

    Ok(config)
}
