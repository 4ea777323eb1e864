use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ChunkId = String;

/// Where a chunk came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Source document name (file name for ingested files).
    pub document: String,
    pub chunk_index: usize,
    /// Byte offset of the chunk inside the cleaned document text.
    pub offset: usize,
    pub ingested_at: DateTime<Utc>,
}

/// A stored, embedded unit of source text. Never mutated after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Empty when the store does not hand vectors back on read.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

/// A chunk paired with its cosine distance to one query (lower is closer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub distance: f32,
}

/// Ranked context for one query: ascending distance, unique ids, at most `top_k` entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RetrievalResult {
    chunks: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sorts by distance (ties by id), keeps the closest copy of each id and
    /// truncates to `top_k`.
    pub fn from_ranked(mut hits: Vec<ScoredChunk>, top_k: usize) -> Self {
        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });

        let mut seen = HashSet::new();
        let chunks = hits
            .into_iter()
            .filter(|hit| seen.insert(hit.chunk.id.clone()))
            .take(top_k)
            .collect();

        Self { chunks }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredChunk> {
        self.chunks.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.chunks.iter().map(|c| c.chunk.id.as_str()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.chunks.iter().any(|c| c.chunk.id == id)
    }
}

impl<'a> IntoIterator for &'a RetrievalResult {
    type Item = &'a ScoredChunk;
    type IntoIter = std::slice::Iter<'a, ScoredChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnswerStatus {
    Ok,
    NoContext,
    LlmError,
}

/// The response to one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    text: String,
    sources: Vec<ChunkId>,
    status: AnswerStatus,
    latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Answer {
    pub(crate) fn ok(text: String, sources: Vec<ChunkId>, latency_ms: u64) -> Self {
        Self {
            text,
            sources,
            status: AnswerStatus::Ok,
            latency_ms,
            error: None,
        }
    }

    pub(crate) fn no_context(text: &str, latency_ms: u64) -> Self {
        Self {
            text: text.to_string(),
            sources: Vec::new(),
            status: AnswerStatus::NoContext,
            latency_ms,
            error: None,
        }
    }

    pub(crate) fn llm_error(text: &str, error: String, latency_ms: u64) -> Self {
        Self {
            text: text.to_string(),
            sources: Vec::new(),
            status: AnswerStatus::LlmError,
            latency_ms,
            error: Some(error),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Ids of the chunks placed in the prompt, in retrieval rank order.
    pub fn sources(&self) -> &[ChunkId] {
        &self.sources
    }

    pub fn status(&self) -> AnswerStatus {
        self.status
    }

    pub fn latency_ms(&self) -> u64 {
        self.latency_ms
    }

    /// Model failure detail when `status` is `LlmError`.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

// OpenAI-compatible chat completion wire types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    #[serde(default)]
    pub finish_reason: Option<String>,
}
