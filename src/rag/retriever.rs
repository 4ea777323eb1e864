use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use super::embeddings::Embedder;
use super::vector_store::VectorStore;
use crate::config::MAX_COSINE_DISTANCE;
use crate::error::{RagError, Result};
use crate::models::RetrievalResult;

/// Read path: question -> embedding -> nearest chunks, filtered and ranked.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    embed_timeout: Duration,
    store_timeout: Duration,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        embed_timeout: Duration,
        store_timeout: Duration,
    ) -> Result<Self> {
        if embedder.dimension() != store.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: store.dimension(),
                actual: embedder.dimension(),
            });
        }

        Ok(Self {
            embedder,
            store,
            embed_timeout,
            store_timeout,
        })
    }

    /// Returns at most `top_k` chunks whose cosine distance to the question is at most
    /// `max_distance`, closest first. An empty result is not an error.
    pub async fn retrieve(&self, question: &str, top_k: usize, max_distance: f32) -> Result<RetrievalResult> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidQuery("question is empty".into()));
        }
        if top_k == 0 {
            return Err(RagError::InvalidQuery("top_k must be at least 1".into()));
        }
        if !(0.0..=MAX_COSINE_DISTANCE).contains(&max_distance) {
            return Err(RagError::InvalidQuery(format!(
                "max_distance must be within [0, {}], got {}",
                MAX_COSINE_DISTANCE, max_distance
            )));
        }

        let vector = timeout(self.embed_timeout, self.embedder.embed(question))
            .await
            .map_err(|_| {
                RagError::EmbeddingFailure(format!("timed out after {:?}", self.embed_timeout))
            })?
            .map_err(|e| RagError::EmbeddingFailure(format!("{:#}", e)))?;

        if vector.len() != self.store.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: self.store.dimension(),
                actual: vector.len(),
            });
        }

        let hits = timeout(self.store_timeout, self.store.query(&vector, top_k))
            .await
            .map_err(|_| RagError::StoreFailure(format!("timed out after {:?}", self.store_timeout)))?
            .map_err(|e| RagError::StoreFailure(format!("{:#}", e)))?;

        let candidates = hits.len();
        let relevant = hits
            .into_iter()
            .filter(|hit| hit.distance.is_finite() && hit.distance <= max_distance)
            .collect();
        let result = RetrievalResult::from_ranked(relevant, top_k);

        tracing::debug!(
            candidates,
            kept = result.len(),
            max_distance,
            "retrieved context"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoredChunk;
    use crate::rag::local_store::LocalStore;
    use crate::testing::{chunk, embedded_chunk, FailingEmbedder, FixedEmbedder, SlowEmbedder, StaticStore};
    use tokio_test::assert_ok;

    const LOOSE: f32 = 2.0;

    fn retriever(embedder: impl Embedder + 'static, store: impl VectorStore + 'static) -> Retriever {
        Retriever::new(
            Arc::new(embedder),
            Arc::new(store),
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_single_matching_chunk() {
        let e = vec![0.6, 0.8, 0.0];
        let store = LocalStore::in_memory(3);
        store
            .upsert(&[embedded_chunk("c1", "The sky is blue.", e.clone())])
            .await
            .unwrap();

        let result = assert_ok!(
            retriever(FixedEmbedder::new(e), store)
                .retrieve("Why is the sky blue?", 4, LOOSE)
                .await
        );

        assert_eq!(result.ids(), vec!["c1"]);
        assert!(result.iter().next().unwrap().distance.abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_empty_store_is_not_an_error() {
        let result = retriever(FixedEmbedder::new(vec![1.0, 0.0]), LocalStore::in_memory(2))
            .retrieve("anything", 4, 0.5)
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_filters_by_distance_and_dedups() {
        let hits = vec![
            ScoredChunk { chunk: chunk("far", "x"), distance: 0.9 },
            ScoredChunk { chunk: chunk("dup", "y"), distance: 0.3 },
            ScoredChunk { chunk: chunk("best", "z"), distance: 0.1 },
            ScoredChunk { chunk: chunk("dup", "y"), distance: 0.2 },
        ];
        let result = retriever(FixedEmbedder::new(vec![1.0, 0.0]), StaticStore::new(2, hits))
            .retrieve("question", 4, 0.5)
            .await
            .unwrap();

        assert_eq!(result.ids(), vec!["best", "dup"]);
        let distances: Vec<f32> = result.iter().map(|c| c.distance).collect();
        assert_eq!(distances, vec![0.1, 0.2]);
    }

    #[tokio::test]
    async fn test_never_exceeds_top_k_and_is_idempotent() {
        let store = LocalStore::in_memory(2);
        let chunks: Vec<_> = (0..10)
            .map(|i| embedded_chunk(&format!("c{}", i), "t", vec![1.0, i as f32 * 0.1]))
            .collect();
        store.upsert(&chunks).await.unwrap();
        let retriever = retriever(FixedEmbedder::new(vec![1.0, 0.0]), store);

        for top_k in 1..=12 {
            let first = retriever.retrieve("q", top_k, LOOSE).await.unwrap();
            let second = retriever.retrieve("q", top_k, LOOSE).await.unwrap();
            assert!(first.len() <= top_k);
            assert_eq!(first, second);
            let distances: Vec<f32> = first.iter().map(|c| c.distance).collect();
            assert!(distances.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[tokio::test]
    async fn test_invalid_queries() {
        let retriever = retriever(FixedEmbedder::new(vec![1.0, 0.0]), LocalStore::in_memory(2));

        for (question, top_k, max_distance) in [("   ", 4, 0.5), ("q", 0, 0.5), ("q", 4, -0.1), ("q", 4, f32::NAN)] {
            let err = retriever.retrieve(question, top_k, max_distance).await.unwrap_err();
            assert!(matches!(err, RagError::InvalidQuery(_)), "{:?}", err);
        }
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let err = retriever(FailingEmbedder::new(2), LocalStore::in_memory(2))
            .retrieve("q", 4, 0.5)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::EmbeddingFailure(_)));
    }

    #[tokio::test]
    async fn test_embedding_timeout_is_a_failure() {
        let retriever = Retriever::new(
            Arc::new(SlowEmbedder::new(2, Duration::from_secs(5))),
            Arc::new(LocalStore::in_memory(2)),
            Duration::from_millis(50),
            Duration::from_secs(5),
        )
        .unwrap();

        let err = retriever.retrieve("q", 4, 0.5).await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingFailure(_)));
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let err = retriever(FixedEmbedder::new(vec![1.0, 0.0]), StaticStore::failing(2))
            .retrieve("q", 4, 0.5)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::StoreFailure(_)));
    }

    #[test]
    fn test_dimension_mismatch_is_a_configuration_error() {
        let result = Retriever::new(
            Arc::new(FixedEmbedder::new(vec![1.0, 0.0, 0.0])),
            Arc::new(LocalStore::in_memory(2)),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert!(matches!(
            result,
            Err(RagError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }
}
