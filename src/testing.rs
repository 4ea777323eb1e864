//! Test doubles for the collaborator traits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::llm::LanguageModel;
use crate::models::{Chunk, ChunkMetadata, RetrievalResult, ScoredChunk};
use crate::rag::embeddings::Embedder;
use crate::rag::vector_store::VectorStore;

pub fn chunk(id: &str, text: &str) -> Chunk {
    Chunk {
        id: id.to_string(),
        text: text.to_string(),
        metadata: ChunkMetadata {
            document: "doc.txt".to_string(),
            chunk_index: 0,
            offset: 0,
            ingested_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        },
        embedding: Vec::new(),
    }
}

pub fn embedded_chunk(id: &str, text: &str, embedding: Vec<f32>) -> Chunk {
    Chunk {
        embedding,
        ..chunk(id, text)
    }
}

/// Retrieval result in the given order with increasing distances.
pub fn ranked(items: &[(&str, &str)]) -> RetrievalResult {
    let hits = items
        .iter()
        .enumerate()
        .map(|(i, (id, text))| ScoredChunk {
            chunk: chunk(id, text),
            distance: i as f32 * 0.1,
        })
        .collect();
    RetrievalResult::from_ranked(hits, items.len().max(1))
}

/// Returns the same vector for every input.
pub struct FixedEmbedder {
    vector: Vec<f32>,
    calls: AtomicUsize,
}

impl FixedEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    fn dimension(&self) -> usize {
        self.vector.len()
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector.clone())
    }
}

pub struct FailingEmbedder {
    dimension: usize,
}

impl FailingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for FailingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        anyhow::bail!("embedding backend unreachable")
    }
}

pub struct SlowEmbedder {
    dimension: usize,
    delay: Duration,
}

impl SlowEmbedder {
    pub fn new(dimension: usize, delay: Duration) -> Self {
        Self { dimension, delay }
    }
}

#[async_trait]
impl Embedder for SlowEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        tokio::time::sleep(self.delay).await;
        Ok(vec![0.0; self.dimension])
    }
}

/// Store that answers every query with a fixed hit list (or fails).
pub struct StaticStore {
    dimension: usize,
    hits: Option<Vec<ScoredChunk>>,
}

impl StaticStore {
    pub fn new(dimension: usize, hits: Vec<ScoredChunk>) -> Self {
        Self {
            dimension,
            hits: Some(hits),
        }
    }

    pub fn failing(dimension: usize) -> Self {
        Self { dimension, hits: None }
    }
}

#[async_trait]
impl VectorStore for StaticStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, _chunks: &[Chunk]) -> Result<()> {
        anyhow::bail!("read-only store")
    }

    async fn query(&self, _vector: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        match &self.hits {
            Some(hits) => Ok(hits.iter().take(top_k).cloned().collect()),
            None => anyhow::bail!("store unreachable"),
        }
    }

    async fn chunk_ids(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn delete(&self, _ids: &[String]) -> Result<()> {
        Ok(())
    }
}

/// Replies with a fixed text and records every prompt.
pub struct CountingModel {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl CountingModel {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LanguageModel for CountingModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

pub struct FailingModel;

#[async_trait]
impl LanguageModel for FailingModel {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        anyhow::bail!("429 Too Many Requests")
    }
}

pub struct SlowModel {
    delay: Duration,
}

impl SlowModel {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl LanguageModel for SlowModel {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        tokio::time::sleep(self.delay).await;
        Ok("too late".to_string())
    }
}
