//! Batch ingestion engine.
//!
//! Drives one pass over the staging inbox: enumerate files, then per file
//! load → chunk → embed (batched) → upsert, and finally relocate the file
//! into the `processed/` archive. The atomic rename is the sole commit
//! point and the dedup ledger: a file in `processed/` is never
//! re-ingested, and a file that failed stays in the inbox for the next
//! run. One document's failure never aborts the rest of the batch.
//!
//! Record ids derive from the document name and chunk position, so a
//! retried document upserts the same ids instead of duplicating records.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::chunker::{Chunk, Chunker};
use crate::config::StagingConfig;
use crate::embedding::Embedder;
use crate::index::{IndexRecord, VectorIndex};
use crate::loader;

/// One document that could not be ingested this pass. The source file is
/// left in the inbox for inspection and retry.
#[derive(Debug, Clone)]
pub struct DocumentFailure {
    pub name: String,
    pub reason: String,
}

/// Summary of one ingestion pass.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Documents successfully ingested and relocated, in scan order.
    pub processed: Vec<String>,
    pub failed: Vec<DocumentFailure>,
    pub chunks_upserted: u64,
}

pub struct IngestionEngine {
    chunker: Chunker,
    embedder: Box<dyn Embedder>,
    index: Box<dyn VectorIndex>,
    batch_size: usize,
}

impl IngestionEngine {
    pub fn new(
        chunker: Chunker,
        embedder: Box<dyn Embedder>,
        index: Box<dyn VectorIndex>,
        batch_size: usize,
    ) -> Self {
        Self {
            chunker,
            embedder,
            index,
            batch_size: batch_size.max(1),
        }
    }

    /// Run one batch ingestion pass over the staging directory.
    ///
    /// An empty (or missing) inbox completes with zero documents
    /// processed — it is not an error. No two passes over the same
    /// staging directory should run concurrently.
    pub async fn run(
        &self,
        staging: &StagingConfig,
        dry_run: bool,
        limit: Option<usize>,
    ) -> Result<IngestReport> {
        // Ingestion-time and query-time vectors live in one embedding
        // space; a dims mismatch here can only produce a poisoned index.
        if self.embedder.dims() != self.index.dims() {
            bail!(
                "embedding dimension {} does not match index dimension {}",
                self.embedder.dims(),
                self.index.dims()
            );
        }

        let root = &staging.root;
        if !root.exists() {
            std::fs::create_dir_all(root)
                .with_context(|| format!("Failed to create staging directory {}", root.display()))?;
            return Ok(IngestReport::default());
        }

        let processed_path = staging.processed_path();
        if !dry_run {
            std::fs::create_dir_all(&processed_path).with_context(|| {
                format!("Failed to create processed area {}", processed_path.display())
            })?;
        }

        let mut files = scan_inbox(root, &processed_path, &staging.include_globs)?;
        if let Some(lim) = limit {
            files.truncate(lim);
        }

        let mut report = IngestReport::default();

        for path in &files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            match self.ingest_file(path, dry_run).await {
                Ok(chunk_count) => {
                    if !dry_run {
                        // The relocation is the commit: only after it can
                        // the file be observed as ingested.
                        if let Err(e) = std::fs::rename(path, processed_path.join(&name)) {
                            report.failed.push(DocumentFailure {
                                name,
                                reason: format!("relocation failed: {}", e),
                            });
                            continue;
                        }
                    }
                    report.chunks_upserted += chunk_count;
                    report.processed.push(name);
                }
                Err(e) => {
                    report.failed.push(DocumentFailure {
                        name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Ingest a single staged file. Returns the number of chunks upserted.
    async fn ingest_file(&self, path: &Path, dry_run: bool) -> Result<u64> {
        let doc = loader::load_document(path)?;

        if doc.text.trim().is_empty() {
            bail!("no extractable text (possibly a scanned image)");
        }

        let chunks: Vec<Chunk> = self.chunker.chunks(&doc.name, &doc.text).collect();

        if dry_run {
            return Ok(chunks.len() as u64);
        }

        let mut upserted = 0u64;
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;

            let records: Vec<IndexRecord> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| IndexRecord {
                    id: chunk.id.clone(),
                    vector,
                    text: chunk.text.clone(),
                    document_id: chunk.document_id.clone(),
                    chunk_index: chunk.index,
                })
                .collect();

            self.index.upsert(&records).await?;
            upserted += records.len() as u64;
        }

        Ok(upserted)
    }
}

/// Enumerate staged files: top-level inbox entries matching the include
/// globs, with the processed archive excluded. Sorted by name so passes
/// are deterministic.
///
/// The scan is flat. Document ids are bare file names, so a nested file
/// sharing a name with a top-level one would collide with it in both the
/// index and the archive.
fn scan_inbox(root: &Path, processed: &Path, include_globs: &[String]) -> Result<Vec<PathBuf>> {
    let include_set = build_globset(include_globs)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.starts_with(processed) {
            continue;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if !include_set.is_match(&name) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
