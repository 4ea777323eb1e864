use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use futures::FutureExt;
use indicatif::ProgressBar;
use sha2::{Digest, Sha256};

use super::chunker::chunk_text;
use super::extractor::extract_text;
use super::walker::walk_directory;
use crate::config::IngestSettings;
use crate::error::RagError;
use crate::models::{Chunk, ChunkMetadata};
use crate::rag::embeddings::Embedder;
use crate::rag::vector_store::VectorStore;

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub files_indexed: usize,
    /// Files with no substantive text after cleaning.
    pub files_empty: usize,
    pub total_chunks: usize,
    pub failed_files: Vec<(PathBuf, String)>,
    pub pruned_chunks: usize,
}

/// Stable id prefix for a document key (a path for files).
fn document_id(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

fn id_prefix(chunk_id: &str) -> &str {
    chunk_id.split('_').next().unwrap_or("")
}

/// Write path: text -> chunks -> embeddings -> store.
pub struct IngestionPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    chunk_size: usize,
    chunk_overlap: usize,
    batch_size: usize,
}

impl IngestionPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        settings: &IngestSettings,
    ) -> crate::error::Result<Self> {
        if embedder.dimension() != store.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: store.dimension(),
                actual: embedder.dimension(),
            });
        }
        if settings.chunk_overlap >= settings.chunk_size || settings.batch_size == 0 {
            return Err(RagError::Config(
                "chunk_overlap must be smaller than chunk_size and batch_size positive".into(),
            ));
        }

        Ok(Self {
            embedder,
            store,
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
            batch_size: settings.batch_size,
        })
    }

    /// Chunks, embeds and upserts `text` under `document`. Re-ingesting the same
    /// document replaces its chunks: ids from the previous version that this one no
    /// longer produces are deleted. Returns the chunk ids written.
    pub async fn ingest_text(&self, document: &str, text: &str) -> Result<Vec<String>> {
        self.index_text(&document_id(document), document, text).await
    }

    /// A file with no substantive text left drops whatever it indexed before.
    pub async fn ingest_file(&self, path: &Path) -> Result<Vec<String>> {
        let prefix = document_id(&path.to_string_lossy());
        let Some(text) = extract_text(path)? else {
            self.remove_stale(&prefix, &[]).await?;
            return Ok(Vec::new());
        };

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        self.index_text(&prefix, &name, &text).await
    }

    async fn index_text(&self, prefix: &str, document: &str, text: &str) -> Result<Vec<String>> {
        let chunks = chunk_text(text, self.chunk_size, self.chunk_overlap);
        let ingested_at = Utc::now();
        let mut chunk_ids = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(texts).await?;
            if vectors.len() != batch.len() {
                anyhow::bail!("embedder returned {} vectors for {} chunks", vectors.len(), batch.len());
            }

            let stored: Vec<Chunk> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, embedding)| Chunk {
                    id: format!("{}_{}", prefix, chunk.chunk_index),
                    text: chunk.text.clone(),
                    metadata: ChunkMetadata {
                        document: document.to_string(),
                        chunk_index: chunk.chunk_index,
                        offset: chunk.offset,
                        ingested_at,
                    },
                    embedding,
                })
                .collect();

            self.store.upsert(&stored).await?;
            chunk_ids.extend(stored.into_iter().map(|c| c.id));
        }

        self.remove_stale(prefix, &chunk_ids).await?;
        tracing::debug!("Indexed {} chunks for {}", chunk_ids.len(), document);
        Ok(chunk_ids)
    }

    /// Deletes chunks under `prefix` that are not in `written`.
    async fn remove_stale(&self, prefix: &str, written: &[String]) -> Result<()> {
        let stale: Vec<String> = self
            .store
            .chunk_ids()
            .await?
            .into_iter()
            .filter(|id| id_prefix(id) == prefix && !written.contains(id))
            .collect();

        if !stale.is_empty() {
            tracing::debug!("Removing {} outdated chunks with prefix {}", stale.len(), prefix);
            self.store.delete(&stale).await?;
        }
        Ok(())
    }

    /// Ingests every supported file under `dir`. With `prune`, chunks in the store
    /// that this run did not write are deleted, except those of files that failed.
    pub async fn ingest_dir(&self, dir: &Path, prune: bool, progress: Option<&ProgressBar>) -> Result<IngestReport> {
        if !dir.is_dir() {
            anyhow::bail!("Directory does not exist: {}", dir.display());
        }

        let files = walk_directory(dir);
        tracing::info!("Indexing {} files from {}", files.len(), dir.display());
        if let Some(pb) = progress {
            pb.set_length(files.len() as u64);
        }

        let mut report = IngestReport::default();
        let mut current_ids: HashSet<String> = HashSet::new();
        let mut protected: HashSet<String> = HashSet::new();

        for path in &files {
            if let Some(pb) = progress {
                pb.set_message(path.file_name().unwrap_or_default().to_string_lossy().to_string());
            }

            // a panicking file must not take the whole run down
            let outcome = std::panic::AssertUnwindSafe(self.ingest_file(path))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(anyhow::anyhow!("panicked: {}", panic_message(&*panic))));

            match outcome {
                Ok(ids) if ids.is_empty() => report.files_empty += 1,
                Ok(ids) => {
                    report.files_indexed += 1;
                    report.total_chunks += ids.len();
                    current_ids.extend(ids);
                }
                Err(e) => {
                    tracing::warn!("Failed to index {}: {:#}", path.display(), e);
                    protected.insert(document_id(&path.to_string_lossy()));
                    report.failed_files.push((path.clone(), format!("{:#}", e)));
                }
            }

            if let Some(pb) = progress {
                pb.inc(1);
            }
        }

        if prune {
            let stale: Vec<String> = self
                .store
                .chunk_ids()
                .await?
                .into_iter()
                .filter(|id| !current_ids.contains(id) && !protected.contains(id_prefix(id)))
                .collect();

            if !stale.is_empty() {
                tracing::info!("Cleaning up {} stale chunks", stale.len());
                self.store.delete(&stale).await?;
            }
            report.pruned_chunks = stale.len();
        }

        tracing::info!(
            "Indexing complete: {} files, {} chunks, {} failed",
            report.files_indexed,
            report.total_chunks,
            report.failed_files.len()
        );
        Ok(report)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
