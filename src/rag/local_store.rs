use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use super::vector_store::{check_dimension, cosine_distance, VectorStore};
use crate::models::{Chunk, ScoredChunk};

#[derive(Deserialize)]
struct Snapshot {
    dimension: usize,
    chunks: Vec<Chunk>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    dimension: usize,
    chunks: Vec<&'a Chunk>,
}

/// In-process store with exhaustive cosine search. When opened with a path every
/// mutation rewrites a JSON snapshot, so an indexer run and a later query process
/// see the same data. A mutation becomes visible to queries only after its snapshot
/// is on disk; a failed write leaves both the map and the file untouched.
pub struct LocalStore {
    dimension: usize,
    path: Option<PathBuf>,
    chunks: RwLock<BTreeMap<String, Chunk>>,
    /// Serialises mutations so snapshots land in the order they were applied.
    writer: Mutex<()>,
}

impl LocalStore {
    pub fn in_memory(dimension: usize) -> Self {
        Self {
            dimension,
            path: None,
            chunks: RwLock::new(BTreeMap::new()),
            writer: Mutex::new(()),
        }
    }

    pub fn open(path: &Path, dimension: usize) -> Result<Self> {
        let mut chunks = BTreeMap::new();

        if path.exists() {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read store snapshot: {}", path.display()))?;
            let snapshot: Snapshot = serde_json::from_str(&data)
                .with_context(|| format!("Corrupted store snapshot: {}", path.display()))?;
            if snapshot.dimension != dimension {
                anyhow::bail!(
                    "store snapshot {} holds {}-dimensional vectors, configured dimension is {}",
                    path.display(),
                    snapshot.dimension,
                    dimension
                );
            }
            for chunk in snapshot.chunks {
                chunks.insert(chunk.id.clone(), chunk);
            }
            tracing::info!("Loaded {} chunks from {}", chunks.len(), path.display());
        }

        Ok(Self {
            dimension,
            path: Some(path.to_path_buf()),
            chunks: RwLock::new(chunks),
            writer: Mutex::new(()),
        })
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }

    /// Applies `change` to a copy of the map, persists the copy, then swaps it in.
    /// Queries keep reading the previous map while the snapshot is written.
    async fn mutate<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, Chunk>) + Send,
    {
        let _writer = self.writer.lock().await;

        let mut next = self.chunks.read().await.clone();
        change(&mut next);
        self.persist(&next).await?;

        *self.chunks.write().await = next;
        Ok(())
    }

    async fn persist(&self, chunks: &BTreeMap<String, Chunk>) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };

        let snapshot = SnapshotRef {
            dimension: self.dimension,
            chunks: chunks.values().collect(),
        };
        let data = serde_json::to_vec(&snapshot)?;

        tokio::task::spawn_blocking(move || write_snapshot(&path, &data))
            .await
            .context("snapshot writer task failed")?
    }
}

/// Write-then-rename keeps the previous snapshot intact on failure.
fn write_snapshot(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, data)
        .with_context(|| format!("Failed to write store snapshot: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace store snapshot: {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl VectorStore for LocalStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
        for chunk in chunks {
            check_dimension(self.dimension, &chunk.embedding)
                .with_context(|| format!("chunk {}", chunk.id))?;
        }

        self.mutate(|stored| {
            for chunk in chunks {
                stored.insert(chunk.id.clone(), chunk.clone());
            }
        })
        .await
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        check_dimension(self.dimension, vector)?;

        let stored = self.chunks.read().await;
        let mut hits: Vec<ScoredChunk> = stored
            .values()
            .map(|chunk| ScoredChunk {
                distance: cosine_distance(vector, &chunk.embedding),
                chunk: chunk.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn chunk_ids(&self) -> Result<Vec<String>> {
        Ok(self.chunks.read().await.keys().cloned().collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        self.mutate(|stored| {
            for id in ids {
                stored.remove(id);
            }
        })
        .await
    }
}
