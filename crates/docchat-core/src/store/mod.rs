//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait defines every operation the ingestion and
//! retrieval pipeline needs from a vector store, enabling pluggable
//! backends (SQLite in the app crate, [`memory::InMemoryVectorIndex`] here).
//!
//! Implementations must be `Send + Sync` and must make each write atomic at
//! batch granularity: a concurrent reader sees either none or all of an
//! [`upsert`](VectorIndex::upsert).

pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::embedding::DistanceMetric;
use crate::error::{RagError, Result};
use crate::filter::MetadataFilter;
use crate::models::{Chunk, Document, EmbeddedChunk};

/// One retrieved chunk with its distance from the query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub distance: f32,
}

/// Ordered retrieval output, ascending distance (best match first).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    pub hits: Vec<RetrievedChunk>,
    /// True when retrieval was bypassed (`use_rag = false`), as opposed to
    /// having run and found nothing.
    pub skipped: bool,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn skipped() -> Self {
        Self {
            hits: Vec::new(),
            skipped: true,
        }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Distinct source filenames in first-seen (best match first) order.
    pub fn sources(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for hit in &self.hits {
            if !seen.contains(&hit.chunk.metadata.source_file) {
                seen.push(hit.chunk.metadata.source_file.clone());
            }
        }
        seen
    }
}

/// Index statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub total_chunks: usize,
    /// Chunk count per file type.
    pub file_types: BTreeMap<String, usize>,
    pub dims: usize,
    pub metric: String,
    pub total_documents: usize,
    pub average_chunk_chars: f64,
}

/// Abstract vector index.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorIndex::upsert) | Add embedded chunks (atomic per batch) |
/// | [`replace_source`](VectorIndex::replace_source) | Atomically swap all chunks of one source |
/// | [`query`](VectorIndex::query) | Top-k nearest neighbours, optionally filtered |
/// | [`delete_by_source`](VectorIndex::delete_by_source) | Remove a document's chunks (idempotent) |
/// | [`documents`](VectorIndex::documents) | List documents derived from stored chunks |
/// | [`stats`](VectorIndex::stats) | Counts, file-type distribution, dimensionality |
/// | [`clear`](VectorIndex::clear) | Remove everything |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Declared embedding dimensionality.
    fn dims(&self) -> usize;

    /// Distance metric fixed at creation.
    fn metric(&self) -> DistanceMetric;

    /// Add entries. An entry whose chunk id already exists replaces the old
    /// one in place (keeping its insertion position).
    ///
    /// Fails with [`RagError::DimensionMismatch`] before writing anything if
    /// any vector has the wrong length.
    async fn upsert(&self, entries: &[EmbeddedChunk]) -> Result<()>;

    /// Delete every chunk of `source` and insert `entries`, atomically.
    async fn replace_source(&self, source: &str, entries: &[EmbeddedChunk]) -> Result<()>;

    /// Return at most `k` chunks ordered by ascending distance. Ties keep
    /// insertion order. An empty index, or a filter nothing satisfies,
    /// yields an empty result.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<RetrievalResult>;

    /// Remove all chunks whose source matches. Returns the number removed;
    /// deleting an unknown source removes nothing and is not an error.
    async fn delete_by_source(&self, source: &str) -> Result<usize>;

    /// Documents in the index, ordered by source filename.
    async fn documents(&self) -> Result<Vec<Document>>;

    async fn stats(&self) -> Result<IndexStats>;

    /// Remove every chunk. Returns the number removed.
    async fn clear(&self) -> Result<usize>;
}

/// Check every vector in a batch against the index dimensionality, and that
/// all entries of a [`replace_source`](VectorIndex::replace_source) batch
/// belong to that source.
pub fn validate_batch(dims: usize, entries: &[EmbeddedChunk], source: Option<&str>) -> Result<()> {
    for e in entries {
        if e.vector.len() != dims {
            return Err(RagError::DimensionMismatch {
                expected: dims,
                actual: e.vector.len(),
            });
        }
        if let Some(src) = source {
            if e.chunk.metadata.source_file != src {
                return Err(RagError::config(format!(
                    "chunk {} belongs to '{}', not '{}'",
                    e.chunk.id, e.chunk.metadata.source_file, src
                )));
            }
        }
    }
    Ok(())
}

/// Validate query arguments shared by all backends.
pub fn validate_query(dims: usize, vector: &[f32], k: usize) -> Result<()> {
    if k == 0 {
        return Err(RagError::config("k must be > 0"));
    }
    if vector.len() != dims {
        return Err(RagError::DimensionMismatch {
            expected: dims,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Rank `entries` (given in insertion order) against `query` and keep the
/// best `k`. The sort is stable, so equal distances keep insertion order.
pub fn rank_top_k<'a, I>(
    metric: DistanceMetric,
    query: &[f32],
    entries: I,
    k: usize,
    filter: Option<&MetadataFilter>,
) -> Vec<RetrievedChunk>
where
    I: IntoIterator<Item = (&'a Chunk, &'a [f32])>,
{
    let mut scored: Vec<RetrievedChunk> = entries
        .into_iter()
        .filter(|(chunk, _)| filter.map(|f| f.matches(&chunk.metadata)).unwrap_or(true))
        .map(|(chunk, vector)| RetrievedChunk {
            chunk: chunk.clone(),
            distance: metric.distance(query, vector),
        })
        .collect();

    scored.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}

/// Group chunks into [`Document`]s, ordered by source filename.
pub fn group_documents<'a, I>(chunks: I) -> Vec<Document>
where
    I: IntoIterator<Item = &'a Chunk>,
{
    let mut docs: BTreeMap<String, (Document, Vec<(i64, String)>)> = BTreeMap::new();
    for chunk in chunks {
        let entry = docs
            .entry(chunk.metadata.source_file.clone())
            .or_insert_with(|| {
                (
                    Document {
                        id: chunk.metadata.source_file.clone(),
                        file_type: chunk.metadata.file_type.clone(),
                        created_at: chunk.created_at,
                        chunk_ids: Vec::new(),
                        chunk_count: 0,
                    },
                    Vec::new(),
                )
            });
        entry.0.created_at = entry.0.created_at.min(chunk.created_at);
        entry.1.push((chunk.chunk_index, chunk.id.clone()));
    }

    docs.into_values()
        .map(|(mut doc, mut ids)| {
            ids.sort_by_key(|(idx, _)| *idx);
            doc.chunk_count = ids.len();
            doc.chunk_ids = ids.into_iter().map(|(_, id)| id).collect();
            doc
        })
        .collect()
}

/// Build [`IndexStats`] from the stored chunks.
pub fn compute_stats<'a, I>(dims: usize, metric: DistanceMetric, chunks: I) -> IndexStats
where
    I: IntoIterator<Item = &'a Chunk>,
{
    let mut stats = IndexStats {
        dims,
        metric: metric.to_string(),
        ..Default::default()
    };
    let mut sources: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();
    let mut total_chars = 0usize;
    for chunk in chunks {
        stats.total_chunks += 1;
        *stats
            .file_types
            .entry(chunk.metadata.file_type.clone())
            .or_insert(0) += 1;
        sources.insert(chunk.metadata.source_file.as_str());
        total_chars += chunk.len_chars();
    }
    stats.total_documents = sources.len();
    if stats.total_chunks > 0 {
        stats.average_chunk_chars = total_chars as f64 / stats.total_chunks as f64;
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn chunk(id: &str, source: &str, idx: i64) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: source.to_string(),
            chunk_index: idx,
            text: "abcd".to_string(),
            start: 0,
            end: 4,
            hash: String::new(),
            created_at: 100 + idx,
            metadata: ChunkMetadata {
                source_file: source.to_string(),
                file_type: "txt".to_string(),
                chunk_index: idx,
                extra: Default::default(),
            },
        }
    }

    #[test]
    fn test_rank_ties_keep_insertion_order() {
        let a = chunk("a", "s", 0);
        let b = chunk("b", "s", 1);
        let c = chunk("c", "s", 2);
        let v = vec![1.0f32, 0.0];
        let far = vec![0.0f32, 1.0];
        let entries = vec![
            (&a, v.as_slice()),
            (&b, far.as_slice()),
            (&c, v.as_slice()),
        ];
        let ranked = rank_top_k(DistanceMetric::Cosine, &v, entries, 3, None);
        let ids: Vec<&str> = ranked.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_validate_query() {
        assert!(matches!(
            validate_query(2, &[1.0, 0.0], 0),
            Err(RagError::Configuration(_))
        ));
        assert!(matches!(
            validate_query(2, &[1.0], 1),
            Err(RagError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(validate_query(2, &[1.0, 0.0], 1).is_ok());
    }

    #[test]
    fn test_group_documents_orders_chunks() {
        let chunks = vec![chunk("x#1", "x", 1), chunk("y#0", "y", 0), chunk("x#0", "x", 0)];
        let docs = group_documents(chunks.iter());
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "x");
        assert_eq!(docs[0].chunk_ids, vec!["x#0", "x#1"]);
        assert_eq!(docs[0].chunk_count, 2);
        assert_eq!(docs[0].created_at, 100);
    }

    #[test]
    fn test_retrieval_sources_distinct_in_order() {
        let result = RetrievalResult {
            hits: vec![
                RetrievedChunk { chunk: chunk("b#0", "b", 0), distance: 0.1 },
                RetrievedChunk { chunk: chunk("a#0", "a", 0), distance: 0.2 },
                RetrievedChunk { chunk: chunk("b#1", "b", 1), distance: 0.3 },
            ],
            skipped: false,
        };
        assert_eq!(result.sources(), vec!["b", "a"]);
    }
}
