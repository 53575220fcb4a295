//! Write path: chunk a document, embed the chunks, store them.
//!
//! One [`Ingestor::ingest`] call is one atomic unit of work. All chunks are
//! embedded before the index is touched; the index write is a single
//! [`replace_source`](crate::store::VectorIndex::replace_source), so a
//! failure anywhere leaves the previous version of the document in place.
//! Different documents may be ingested concurrently.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chunk::Chunker;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::models::{EmbeddedChunk, SourceInfo};
use crate::store::VectorIndex;

/// Default number of chunk texts per embedding call.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Extracted text of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    /// Source filename; the document's identity.
    pub source_id: String,
    pub text: String,
    pub file_type: String,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl IngestRequest {
    pub fn new(
        source_id: impl Into<String>,
        text: impl Into<String>,
        file_type: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
            file_type: file_type.into(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub chunk_count: usize,
}

/// Chunker + embedder + index, wired together.
pub struct Ingestor {
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
}

impl Ingestor {
    /// # Errors
    ///
    /// [`RagError::Configuration`] when the embedder and index disagree on
    /// dimensionality.
    pub fn new(
        chunker: Chunker,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Result<Self> {
        if embedder.dims() != index.dims() {
            return Err(RagError::config(format!(
                "embedding model '{}' produces {} dims but the index holds {}",
                embedder.model_name(),
                embedder.dims(),
                index.dims()
            )));
        }
        Ok(Self {
            chunker,
            embedder,
            index,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Cap the number of texts per embedding call. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Chunk, embed and store one document, replacing any earlier version.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReport> {
        let mut source = SourceInfo::new(&request.source_id, &request.file_type);
        source.extra = request.extra;

        let chunks = self.chunker.chunk(&source, &request.text);
        let mut entries = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(RagError::EmbeddingUnavailable(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            entries.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(chunk, vector)| EmbeddedChunk { chunk, vector }),
            );
        }

        self.index
            .replace_source(&request.source_id, &entries)
            .await?;

        tracing::info!(
            source = %request.source_id,
            file_type = %request.file_type,
            chunks = entries.len(),
            "ingested document"
        );
        Ok(IngestReport {
            chunk_count: entries.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DistanceMetric;
    use crate::store::memory::InMemoryVectorIndex;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds by character count so vectors are deterministic.
    struct LenEmbedder {
        calls: AtomicUsize,
        fail_after: Option<usize>,
    }

    impl LenEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_after: None,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LenEmbedder {
        fn model_name(&self) -> &str {
            "len"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_after.is_some_and(|limit| n >= limit) {
                return Err(RagError::EmbeddingUnavailable("quota exhausted".into()));
            }
            Ok(texts
                .iter()
                .map(|t| vec![t.chars().count() as f32, 1.0])
                .collect())
        }
    }

    fn index() -> Arc<InMemoryVectorIndex> {
        Arc::new(InMemoryVectorIndex::new(2, DistanceMetric::L2).unwrap())
    }

    #[tokio::test]
    async fn test_ingest_reports_chunk_count() {
        let idx = index();
        let embedder = Arc::new(LenEmbedder::new());
        let ingestor = Ingestor::new(Chunker::new(1000, 200).unwrap(), embedder.clone(), idx.clone())
            .unwrap()
            .with_batch_size(2);

        let report = ingestor
            .ingest(IngestRequest::new("handbook.txt", "a".repeat(2500), "txt"))
            .await
            .unwrap();
        assert_eq!(report.chunk_count, 3);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);

        let docs = idx.documents().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "handbook.txt");
        assert_eq!(docs[0].chunk_count, 3);
    }

    #[tokio::test]
    async fn test_reingest_replaces_previous_version() {
        let idx = index();
        let ingestor =
            Ingestor::new(Chunker::new(100, 0).unwrap(), Arc::new(LenEmbedder::new()), idx.clone())
                .unwrap();

        ingestor
            .ingest(IngestRequest::new("notes.md", "x".repeat(450), "md"))
            .await
            .unwrap();
        ingestor
            .ingest(IngestRequest::new("notes.md", "y".repeat(150), "md"))
            .await
            .unwrap();
        assert_eq!(idx.stats().await.unwrap().total_chunks, 2);

        let report = ingestor
            .ingest(IngestRequest::new("notes.md", "", "md"))
            .await
            .unwrap();
        assert_eq!(report.chunk_count, 0);
        assert!(idx.documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_index_untouched() {
        let idx = index();
        let ok = Ingestor::new(Chunker::new(10, 0).unwrap(), Arc::new(LenEmbedder::new()), idx.clone())
            .unwrap();
        ok.ingest(IngestRequest::new("a.txt", "0123456789abc", "txt"))
            .await
            .unwrap();

        let flaky = Arc::new(LenEmbedder {
            calls: AtomicUsize::new(0),
            fail_after: Some(1),
        });
        let failing = Ingestor::new(Chunker::new(10, 0).unwrap(), flaky, idx.clone())
            .unwrap()
            .with_batch_size(1);
        let err = failing
            .ingest(IngestRequest::new("a.txt", "z".repeat(50), "txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable(_)));

        let docs = idx.documents().await.unwrap();
        assert_eq!(docs[0].chunk_count, 2);
    }

    #[test]
    fn test_dims_disagreement_rejected() {
        let idx = Arc::new(InMemoryVectorIndex::new(3, DistanceMetric::Cosine).unwrap());
        let result = Ingestor::new(Chunker::new(10, 0).unwrap(), Arc::new(LenEmbedder::new()), idx);
        assert!(matches!(result, Err(RagError::Configuration(_))));
    }
}
