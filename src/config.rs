//! Layered settings: struct defaults, then `rag.toml` (or an explicit file), then
//! `RAG__<SECTION>__<KEY>` environment variables.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{RagError, Result};

/// Upper bound of cosine distance.
pub const MAX_COSINE_DISTANCE: f32 = 2.0;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub retrieval: RetrievalSettings,
    pub answer: AnswerSettings,
    pub embedding: EmbeddingSettings,
    pub store: StoreSettings,
    pub llm: LlmSettings,
    pub ingest: IngestSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    /// Cosine distance cut-off; chunks further away than this are dropped.
    pub max_distance: f32,
    pub embed_timeout_secs: u64,
    pub store_timeout_secs: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 4,
            max_distance: 0.6,
            embed_timeout_secs: 30,
            store_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnswerSettings {
    pub max_context_chars: usize,
    pub timeout_secs: u64,
}

impl Default for AnswerSettings {
    fn default() -> Self {
        Self {
            max_context_chars: 6000,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    Fastembed,
    Hashed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub model_dir: PathBuf,
    pub dimension: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Fastembed,
            model_dir: PathBuf::from("/app/models/bge-small-en-v1.5"),
            dimension: 384,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Local,
    Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// Snapshot file of the local store.
    pub path: PathBuf,
    pub qdrant_url: String,
    pub collection: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Local,
            path: PathBuf::from("rag_store.json"),
            qdrant_url: "http://localhost:6334".to_string(),
            collection: "documents".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key: None,
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            batch_size: 32,
        }
    }
}

impl Settings {
    /// Loads settings from `path` (required when given) or from an optional `rag.toml`
    /// in the working directory, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name("rag").required(false),
        };

        let mut settings: Settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("RAG")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        if settings.llm.api_key.is_none() {
            settings.llm.api_key = std::env::var("GROQ_API_KEY").ok().filter(|k| !k.is_empty());
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            return Err(RagError::Config("retrieval.top_k must be at least 1".into()));
        }
        if !(0.0..=MAX_COSINE_DISTANCE).contains(&self.retrieval.max_distance) {
            return Err(RagError::Config(format!(
                "retrieval.max_distance must be within [0, {}], got {}",
                MAX_COSINE_DISTANCE, self.retrieval.max_distance
            )));
        }
        if self.retrieval.embed_timeout_secs == 0
            || self.retrieval.store_timeout_secs == 0
            || self.answer.timeout_secs == 0
        {
            return Err(RagError::Config("timeouts must be at least one second".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(RagError::Config("embedding.dimension must be positive".into()));
        }
        if self.ingest.chunk_size == 0 || self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return Err(RagError::Config(format!(
                "ingest.chunk_overlap ({}) must be smaller than ingest.chunk_size ({})",
                self.ingest.chunk_overlap, self.ingest.chunk_size
            )));
        }
        if self.ingest.batch_size == 0 {
            return Err(RagError::Config("ingest.batch_size must be positive".into()));
        }
        Ok(())
    }
}
