//! Embedding provider abstraction.
//!
//! Defines the [`Embedder`] capability trait and the local fastembed-backed
//! implementation. Embedding runs in-process: document text never crosses
//! the process boundary to produce a vector, which is the pipeline's
//! data-sovereignty property. Ingestion and retrieval must share one
//! embedder configuration — vectors from different models or dimensions
//! are not comparable.

use async_trait::async_trait;

use crate::config::EmbeddingConfig;

/// Embedding failure.
#[derive(Debug)]
pub enum EmbedError {
    /// Malformed input: empty batch, or an empty string within the batch.
    InvalidInput(String),
    /// Model load or inference failure.
    Service(String),
}

impl std::fmt::Display for EmbedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbedError::InvalidInput(e) => write!(f, "invalid embedding input: {}", e),
            EmbedError::Service(e) => write!(f, "embedding service error: {}", e),
        }
    }
}

impl std::error::Error for EmbedError {}

/// Converts batches of text into fixed-dimension vectors.
///
/// Implementations must be deterministic for a fixed model version: the
/// same input always yields the same vector. Callers bound batch sizes
/// themselves; the trait imposes no limit.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;

    /// Vector dimensionality; every produced vector has exactly this length.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Reject batches the model cannot meaningfully embed.
fn validate_batch(texts: &[String]) -> Result<(), EmbedError> {
    if texts.is_empty() {
        return Err(EmbedError::InvalidInput("empty batch".to_string()));
    }
    if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
        return Err(EmbedError::InvalidInput(format!(
            "empty text at batch position {}",
            pos
        )));
    }
    Ok(())
}

/// Create the embedder named by the configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> anyhow::Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Box::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => anyhow::bail!(
            "Local embedding provider requires --features local-embeddings"
        ),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Local Provider (fastembed) ============

/// In-process embedding via fastembed. The model is downloaded from
/// Hugging Face on first use and cached; after that no network calls are
/// made and no text leaves the process.
#[cfg(feature = "local-embeddings")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: std::sync::Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());

        let dims = config.dims.unwrap_or(match model_name.as_str() {
            "all-minilm-l6-v2" => 384,
            "bge-small-en-v1.5" => 384,
            "bge-base-en-v1.5" => 768,
            "nomic-embed-text-v1.5" => 768,
            "multilingual-e5-small" => 384,
            _ => 384,
        });

        let fastembed_model = fastembed_model_for(&model_name)?;
        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
        )
        .map_err(|e| EmbedError::Service(format!("failed to initialize embedding model: {}", e)))?;

        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            model: std::sync::Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

#[cfg(feature = "local-embeddings")]
fn fastembed_model_for(name: &str) -> Result<fastembed::EmbeddingModel, EmbedError> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        other => Err(EmbedError::Service(format!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small",
            other
        ))),
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        validate_batch(texts)?;

        let model = std::sync::Arc::clone(&self.model);
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        let vectors = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| EmbedError::Service("embedding model lock poisoned".to_string()))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| EmbedError::Service(e.to_string()))
        })
        .await
        .map_err(|e| EmbedError::Service(e.to_string()))??;

        for v in &vectors {
            if v.len() != self.dims {
                return Err(EmbedError::Service(format!(
                    "model produced {}-dim vector, expected {}",
                    v.len(),
                    self.dims
                )));
            }
        }

        Ok(vectors)
    }
}
