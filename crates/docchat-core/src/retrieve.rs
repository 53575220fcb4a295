//! Query-time retrieval: embed the query, ask the index for the nearest
//! chunks.

use std::sync::Arc;
use std::time::Duration;

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::filter::MetadataFilter;
use crate::store::{RetrievalResult, VectorIndex};

/// Embeds a query and delegates to a [`VectorIndex`].
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    embed_timeout: Option<Duration>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            embed_timeout: None,
        }
    }

    /// Time-box the embedding call. A timeout is reported as
    /// [`RagError::EmbeddingUnavailable`].
    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = Some(timeout);
        self
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Retrieve the `k` chunks closest to `query`.
    ///
    /// With `use_rag = false` the index is never touched and a skipped,
    /// empty result is returned. A blank query yields an empty result.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
        use_rag: bool,
    ) -> Result<RetrievalResult> {
        if !use_rag {
            return Ok(RetrievalResult::skipped());
        }
        if query.trim().is_empty() {
            return Ok(RetrievalResult::empty());
        }

        let vector = self.embed(query).await?;
        let result = self.index.query(&vector, k, filter).await?;

        tracing::debug!(
            hits = result.len(),
            k,
            filtered = filter.is_some(),
            "retrieved chunks"
        );
        Ok(result)
    }

    async fn embed(&self, query: &str) -> Result<Vec<f32>> {
        let fut = embed_query(self.embedder.as_ref(), query);
        match self.embed_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                RagError::EmbeddingUnavailable(format!(
                    "embedding timed out after {} ms",
                    limit.as_millis()
                ))
            })?,
            None => fut.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DistanceMetric;
    use crate::store::memory::InMemoryVectorIndex;
    use async_trait::async_trait;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            self.0.len()
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(RagError::EmbeddingUnavailable("provider down".into()))
        }
    }

    struct SlowEmbedder;

    #[async_trait]
    impl EmbeddingProvider for SlowEmbedder {
        fn model_name(&self) -> &str {
            "slow"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
        }
    }

    fn index() -> Arc<dyn VectorIndex> {
        Arc::new(InMemoryVectorIndex::new(3, DistanceMetric::Cosine).unwrap())
    }

    #[tokio::test]
    async fn test_use_rag_false_skips() {
        let r = Retriever::new(Arc::new(FailingEmbedder), index());
        let result = r.retrieve("anything", 5, None, false).await.unwrap();
        assert!(result.is_empty());
        assert!(result.skipped);
    }

    #[tokio::test]
    async fn test_blank_query_is_empty() {
        let r = Retriever::new(Arc::new(FailingEmbedder), index());
        let result = r.retrieve("   ", 5, None, true).await.unwrap();
        assert!(result.is_empty());
        assert!(!result.skipped);
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let r = Retriever::new(Arc::new(FailingEmbedder), index());
        let err = r.retrieve("hello", 5, None, true).await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable(_)));
    }

    #[tokio::test]
    async fn test_embedding_timeout() {
        let r = Retriever::new(Arc::new(SlowEmbedder), index())
            .with_embed_timeout(Duration::from_millis(20));
        let err = r.retrieve("hello", 5, None, true).await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable(_)));
    }

    #[tokio::test]
    async fn test_wrong_embedder_dims_is_mismatch() {
        let r = Retriever::new(Arc::new(FixedEmbedder(vec![1.0, 0.0])), index());
        let err = r.retrieve("hello", 5, None, true).await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));
    }
}
