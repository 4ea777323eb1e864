use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qdrant_client::qdrant::{
    point_id::PointIdOptions, CreateCollectionBuilder, DeletePointsBuilder, Distance, PointId,
    PointStruct, PointsIdsList, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::{Map as JsonMap, Value as JsonValue};
use uuid::Uuid;

use crate::models::{Chunk, ChunkMetadata, ScoredChunk};

/// Persists chunks and answers nearest-neighbour queries by cosine distance.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn dimension(&self) -> usize;

    /// Idempotent by chunk id.
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()>;

    /// At most `top_k` entries, closest first.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>>;

    async fn chunk_ids(&self) -> Result<Vec<String>>;

    async fn delete(&self, ids: &[String]) -> Result<()>;
}

/// `1 - cos(a, b)`; a zero vector is treated as orthogonal to everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (norm_a * norm_b)).clamp(0.0, 2.0)
}

/// Qdrant cosine collections report similarity in [-1, 1].
fn distance_from_score(score: f32) -> f32 {
    (1.0 - score).clamp(0.0, 2.0)
}

pub(crate) fn check_dimension(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        anyhow::bail!("vector has {} dimensions, store expects {}", vector.len(), expected);
    }
    Ok(())
}

pub struct QdrantStore {
    client: Qdrant,
    collection_name: String,
    dimension: usize,
}

/// Qdrant only accepts integer or UUID point ids.
fn point_id(chunk_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
}

impl QdrantStore {
    pub async fn new(url: &str, collection_name: &str, dimension: usize) -> Result<Self> {
        tracing::info!("Building Qdrant client for URL: {}", url);
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| anyhow::anyhow!("Qdrant client build failed: {}", e))?;

        let store = Self {
            client,
            collection_name: collection_name.to_string(),
            dimension,
        };

        store.ensure_collection().await?;
        tracing::info!("Qdrant collection '{}' ready", collection_name);

        Ok(store)
    }

    async fn ensure_collection(&self) -> Result<()> {
        if !self.client.collection_exists(&self.collection_name).await? {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection_name)
                        .vectors_config(VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine)),
                )
                .await?;
        }
        Ok(())
    }

    fn to_point(chunk: &Chunk) -> PointStruct {
        let mut payload = JsonMap::new();
        payload.insert("chunk_id".to_string(), JsonValue::String(chunk.id.clone()));
        payload.insert("text".to_string(), JsonValue::String(chunk.text.clone()));
        payload.insert("document".to_string(), JsonValue::String(chunk.metadata.document.clone()));
        payload.insert("chunk_index".to_string(), JsonValue::from(chunk.metadata.chunk_index as u64));
        payload.insert("offset".to_string(), JsonValue::from(chunk.metadata.offset as u64));
        payload.insert(
            "ingested_at".to_string(),
            JsonValue::String(chunk.metadata.ingested_at.to_rfc3339()),
        );
        PointStruct::new(point_id(&chunk.id), chunk.embedding.clone(), payload)
    }

    fn from_payload(payload: &HashMap<String, QdrantValue>) -> Result<Chunk> {
        let string = |key: &str| {
            payload
                .get(key)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .with_context(|| format!("point payload missing '{}'", key))
        };
        let integer = |key: &str| {
            payload
                .get(key)
                .and_then(|v| v.as_integer())
                .and_then(|v| usize::try_from(v).ok())
                .with_context(|| format!("point payload missing '{}'", key))
        };

        let ingested_at = DateTime::parse_from_rfc3339(&string("ingested_at")?)
            .context("point payload has a malformed 'ingested_at'")?
            .with_timezone(&Utc);

        Ok(Chunk {
            id: string("chunk_id")?,
            text: string("text")?,
            metadata: ChunkMetadata {
                document: string("document")?,
                chunk_index: integer("chunk_index")?,
                offset: integer("offset")?,
                ingested_at,
            },
            embedding: Vec::new(),
        })
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        for chunk in chunks {
            check_dimension(self.dimension, &chunk.embedding)?;
        }

        let points: Vec<PointStruct> = chunks.iter().map(Self::to_point).collect();
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection_name, points))
            .await?;

        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        check_dimension(self.dimension, vector)?;

        let search_result = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection_name, vector.to_vec(), top_k as u64)
                    .with_payload(true),
            )
            .await?;

        search_result
            .result
            .into_iter()
            .map(|point| -> Result<ScoredChunk> {
                Ok(ScoredChunk {
                    chunk: Self::from_payload(&point.payload)?,
                    distance: distance_from_score(point.score),
                })
            })
            .collect()
    }

    async fn chunk_ids(&self) -> Result<Vec<String>> {
        let mut all_ids = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(&self.collection_name)
                .limit(100)
                .with_payload(true);

            if let Some(ref off) = offset {
                builder = builder.offset(off.clone());
            }

            let result = self.client.scroll(builder).await?;

            for point in &result.result {
                if let Some(id) = point.payload.get("chunk_id").and_then(|v| v.as_str()) {
                    all_ids.push(id.to_string());
                }
            }

            offset = result.next_page_offset;
            if offset.is_none() {
                break;
            }
        }

        Ok(all_ids)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let point_ids: Vec<PointId> = ids
            .iter()
            .map(|id| PointId {
                point_id_options: Some(PointIdOptions::Uuid(point_id(id))),
            })
            .collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection_name).points(PointsIdsList { ids: point_ids }),
            )
            .await?;

        Ok(())
    }
}
