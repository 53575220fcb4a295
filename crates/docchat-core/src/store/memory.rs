//! In-memory [`VectorIndex`] implementation for tests and embedded use.
//!
//! Entries live in a `Vec` (insertion order) behind a `std::sync::RwLock`.
//! Every write takes the write lock for the whole batch, so readers never
//! observe a half-applied upsert. Search is brute force over all vectors.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::DistanceMetric;
use crate::error::{RagError, Result};
use crate::filter::MetadataFilter;
use crate::models::{Document, EmbeddedChunk};

use super::{
    compute_stats, group_documents, rank_top_k, validate_batch, validate_query, IndexStats,
    RetrievalResult, VectorIndex,
};

/// In-memory vector index.
pub struct InMemoryVectorIndex {
    dims: usize,
    metric: DistanceMetric,
    entries: RwLock<Vec<EmbeddedChunk>>,
}

impl InMemoryVectorIndex {
    /// # Errors
    ///
    /// [`RagError::Configuration`] when `dims == 0`.
    pub fn new(dims: usize, metric: DistanceMetric) -> Result<Self> {
        if dims == 0 {
            return Err(RagError::config("index dimensionality must be > 0"));
        }
        Ok(Self {
            dims,
            metric,
            entries: RwLock::new(Vec::new()),
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<EmbeddedChunk>>> {
        self.entries
            .read()
            .map_err(|_| RagError::storage("in-memory index lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<EmbeddedChunk>>> {
        self.entries
            .write()
            .map_err(|_| RagError::storage("in-memory index lock poisoned"))
    }
}

fn insert_all(stored: &mut Vec<EmbeddedChunk>, entries: &[EmbeddedChunk]) {
    for e in entries {
        match stored.iter_mut().find(|s| s.chunk.id == e.chunk.id) {
            Some(existing) => *existing = e.clone(),
            None => stored.push(e.clone()),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    async fn upsert(&self, entries: &[EmbeddedChunk]) -> Result<()> {
        validate_batch(self.dims, entries, None)?;
        let mut stored = self.write()?;
        insert_all(&mut stored, entries);
        Ok(())
    }

    async fn replace_source(&self, source: &str, entries: &[EmbeddedChunk]) -> Result<()> {
        validate_batch(self.dims, entries, Some(source))?;
        let mut stored = self.write()?;
        stored.retain(|e| e.chunk.metadata.source_file != source);
        insert_all(&mut stored, entries);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<RetrievalResult> {
        validate_query(self.dims, vector, k)?;
        let stored = self.read()?;
        let hits = rank_top_k(
            self.metric,
            vector,
            stored.iter().map(|e| (&e.chunk, e.vector.as_slice())),
            k,
            filter,
        );
        Ok(RetrievalResult {
            hits,
            skipped: false,
        })
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize> {
        let mut stored = self.write()?;
        let before = stored.len();
        stored.retain(|e| e.chunk.metadata.source_file != source);
        Ok(before - stored.len())
    }

    async fn documents(&self) -> Result<Vec<Document>> {
        let stored = self.read()?;
        Ok(group_documents(stored.iter().map(|e| &e.chunk)))
    }

    async fn stats(&self) -> Result<IndexStats> {
        let stored = self.read()?;
        Ok(compute_stats(
            self.dims,
            self.metric,
            stored.iter().map(|e| &e.chunk),
        ))
    }

    async fn clear(&self) -> Result<usize> {
        let mut stored = self.write()?;
        let removed = stored.len();
        stored.clear();
        Ok(removed)
    }
}
