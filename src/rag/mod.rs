pub mod answer;
pub mod embeddings;
pub mod local_store;
pub mod prompt;
pub mod retriever;
pub mod vector_store;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Instrument;
use uuid::Uuid;

use self::answer::AnswerEngine;
use self::embeddings::{Embedder, FastEmbedder, HashedEmbedder};
use self::local_store::LocalStore;
use self::retriever::Retriever;
use self::vector_store::{QdrantStore, VectorStore};
use crate::config::{EmbeddingBackend, Settings, StoreBackend};
use crate::error::{RagError, Result};
use crate::llm::{ChatCompletionModel, LanguageModel};
use crate::models::{Answer, RetrievalResult};

/// Per-query knobs; defaults come from [`Settings`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryOptions {
    pub top_k: usize,
    pub max_distance: f32,
    pub max_context_chars: usize,
}

impl QueryOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            top_k: settings.retrieval.top_k,
            max_distance: settings.retrieval.max_distance,
            max_context_chars: settings.answer.max_context_chars,
        }
    }
}

pub fn build_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    let embedding = &settings.embedding;
    match embedding.backend {
        EmbeddingBackend::Fastembed => {
            let embedder = FastEmbedder::new(&embedding.model_dir, embedding.dimension)
                .map_err(|e| RagError::EmbeddingFailure(format!("{:#}", e)))?;
            Ok(Arc::new(embedder))
        }
        EmbeddingBackend::Hashed => {
            let embedder = HashedEmbedder::new(embedding.dimension)
                .map_err(|e| RagError::Config(format!("{:#}", e)))?;
            Ok(Arc::new(embedder))
        }
    }
}

pub async fn build_store(settings: &Settings) -> Result<Arc<dyn VectorStore>> {
    let store = &settings.store;
    let dimension = settings.embedding.dimension;
    match store.backend {
        StoreBackend::Local => {
            let local = LocalStore::open(&store.path, dimension)
                .map_err(|e| RagError::StoreFailure(format!("{:#}", e)))?;
            Ok(Arc::new(local))
        }
        StoreBackend::Qdrant => {
            let qdrant = QdrantStore::new(&store.qdrant_url, &store.collection, dimension)
                .await
                .map_err(|e| RagError::StoreFailure(format!("{:#}", e)))?;
            Ok(Arc::new(qdrant))
        }
    }
}

/// Process-wide query context: built once at start-up, shared by reference.
/// Holds no mutable state, so concurrent queries need no coordination.
pub struct RagEngine {
    retriever: Retriever,
    answer_engine: AnswerEngine,
    defaults: QueryOptions,
}

impl RagEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LanguageModel>,
        settings: &Settings,
    ) -> Result<Self> {
        let retriever = Retriever::new(
            embedder,
            store,
            Duration::from_secs(settings.retrieval.embed_timeout_secs),
            Duration::from_secs(settings.retrieval.store_timeout_secs),
        )?;
        let answer_engine = AnswerEngine::new(llm, Duration::from_secs(settings.answer.timeout_secs));

        Ok(Self {
            retriever,
            answer_engine,
            defaults: QueryOptions::from_settings(settings),
        })
    }

    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let embedder = build_embedder(settings)?;
        let store = build_store(settings).await?;
        let llm = Arc::new(ChatCompletionModel::new(&settings.llm));

        tracing::info!(
            embedding = ?settings.embedding.backend,
            store = ?settings.store.backend,
            model = %settings.llm.model,
            "RAG engine initialized"
        );
        Self::new(embedder, store, llm, settings)
    }

    pub fn defaults(&self) -> QueryOptions {
        self.defaults
    }

    pub async fn retrieve(&self, question: &str, top_k: usize, max_distance: f32) -> Result<RetrievalResult> {
        self.retriever.retrieve(question, top_k, max_distance).await
    }

    pub async fn answer(&self, question: &str, context: &RetrievalResult, max_context_chars: usize) -> Answer {
        self.answer_engine.answer(question, context, max_context_chars).await
    }

    pub async fn ask(&self, question: &str) -> Result<Answer> {
        self.ask_with(question, &self.defaults).await
    }

    /// Retrieval errors propagate; generation errors come back inside the answer.
    /// `latency_ms` covers retrieval and generation.
    pub async fn ask_with(&self, question: &str, options: &QueryOptions) -> Result<Answer> {
        let started = Instant::now();
        let span = tracing::info_span!("query", id = %Uuid::new_v4());

        async move {
            let context = self
                .retriever
                .retrieve(question, options.top_k, options.max_distance)
                .await
                .inspect_err(|e| tracing::warn!("Retrieval failed: {}", e))?;

            let answer = self
                .answer_engine
                .answer_since(started, question, &context, options.max_context_chars)
                .await;

            tracing::info!(
                status = ?answer.status(),
                sources = answer.sources().len(),
                latency_ms = answer.latency_ms(),
                "query answered"
            );
            Ok::<_, RagError>(answer)
        }
        .instrument(span)
        .await
    }
}
