//! SQLite-backed [`VectorIndex`] implementation.
//!
//! Chunks and their embeddings live in one `chunks` table; vectors are
//! little-endian f32 BLOBs (see [`vec_to_blob`]). Search is brute force:
//! every vector is loaded and ranked in process with the shared
//! [`rank_top_k`], which is plenty for a personal document collection.
//!
//! Every write runs in a single transaction, so concurrent readers see a
//! batch either completely or not at all. The index's dimensionality and
//! metric are recorded in `index_meta` on first open and checked on every
//! later open.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use docchat_core::embedding::{blob_to_vec, vec_to_blob, DistanceMetric};
use docchat_core::error::{RagError, Result};
use docchat_core::filter::MetadataFilter;
use docchat_core::models::{Chunk, ChunkMetadata, Document, EmbeddedChunk};
use docchat_core::store::{
    compute_stats, group_documents, rank_top_k, validate_batch, validate_query, IndexStats,
    RetrievalResult, VectorIndex,
};

const CHUNK_COLUMNS: &str = "id, source_file, file_type, chunk_index, text, start_char, \
                             end_char, hash, created_at, extra_json";

/// SQLite implementation of the [`VectorIndex`] trait.
pub struct SqliteVectorIndex {
    pool: SqlitePool,
    dims: usize,
    metric: DistanceMetric,
}

fn storage(e: impl std::fmt::Display) -> RagError {
    RagError::storage(e)
}

impl SqliteVectorIndex {
    /// Open the index on an already-migrated pool.
    ///
    /// # Errors
    ///
    /// [`RagError::Configuration`] when `dims == 0`, or when the database
    /// already holds chunks embedded with a different dimensionality or
    /// metric. An empty index adopts the new settings.
    pub async fn open(pool: SqlitePool, dims: usize, metric: DistanceMetric) -> Result<Self> {
        if dims == 0 {
            return Err(RagError::config("index dimensionality must be > 0"));
        }

        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM index_meta")
            .fetch_all(&pool)
            .await
            .map_err(storage)?;
        let meta: HashMap<String, String> = rows.into_iter().collect();

        let same = meta.get("dims").map(String::as_str) == Some(dims.to_string().as_str())
            && meta.get("metric").map(String::as_str) == Some(metric.as_str());

        if !same {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
                .fetch_one(&pool)
                .await
                .map_err(storage)?;
            if count > 0 {
                return Err(RagError::config(format!(
                    "index holds {} chunks embedded with dims={} metric={}, but dims={} metric={} \
                     is configured; clear the index or restore the embedding settings",
                    count,
                    meta.get("dims").map(String::as_str).unwrap_or("?"),
                    meta.get("metric").map(String::as_str).unwrap_or("?"),
                    dims,
                    metric
                )));
            }
            for (key, value) in [("dims", dims.to_string()), ("metric", metric.to_string())] {
                sqlx::query(
                    "INSERT INTO index_meta (key, value) VALUES (?, ?) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                )
                .bind(key)
                .bind(value)
                .execute(&pool)
                .await
                .map_err(storage)?;
            }
            tracing::info!(dims, %metric, "initialized vector index");
        }

        Ok(Self { pool, dims, metric })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_chunks(&self) -> Result<Vec<Chunk>> {
        let sql = format!("SELECT {} FROM chunks ORDER BY seq", CHUNK_COLUMNS);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        rows.iter().map(row_to_chunk).collect()
    }
}

/// Chunks of one source, in chunk order.
pub async fn source_chunks(pool: &SqlitePool, source: &str) -> Result<Vec<Chunk>> {
    let sql = format!(
        "SELECT {} FROM chunks WHERE source_file = ? ORDER BY chunk_index",
        CHUNK_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(source)
        .fetch_all(pool)
        .await
        .map_err(storage)?;
    rows.iter().map(row_to_chunk).collect()
}

fn row_to_chunk(row: &SqliteRow) -> Result<Chunk> {
    let source_file: String = row.try_get("source_file").map_err(storage)?;
    let file_type: String = row.try_get("file_type").map_err(storage)?;
    let chunk_index: i64 = row.try_get("chunk_index").map_err(storage)?;
    let start: i64 = row.try_get("start_char").map_err(storage)?;
    let end: i64 = row.try_get("end_char").map_err(storage)?;
    let extra_json: String = row.try_get("extra_json").map_err(storage)?;
    let extra = serde_json::from_str(&extra_json).map_err(storage)?;

    Ok(Chunk {
        id: row.try_get("id").map_err(storage)?,
        document_id: source_file.clone(),
        chunk_index,
        text: row.try_get("text").map_err(storage)?,
        start: start as usize,
        end: end as usize,
        hash: row.try_get("hash").map_err(storage)?,
        created_at: row.try_get("created_at").map_err(storage)?,
        metadata: ChunkMetadata {
            source_file,
            file_type,
            chunk_index,
            extra,
        },
    })
}

async fn insert_entries(tx: &mut Transaction<'_, Sqlite>, entries: &[EmbeddedChunk]) -> Result<()> {
    for entry in entries {
        let chunk = &entry.chunk;
        let extra_json = serde_json::to_string(&chunk.metadata.extra).map_err(storage)?;
        sqlx::query(
            r#"
            INSERT INTO chunks (id, source_file, file_type, chunk_index, text, start_char,
                                end_char, hash, created_at, extra_json, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source_file = excluded.source_file,
                file_type = excluded.file_type,
                chunk_index = excluded.chunk_index,
                text = excluded.text,
                start_char = excluded.start_char,
                end_char = excluded.end_char,
                hash = excluded.hash,
                created_at = excluded.created_at,
                extra_json = excluded.extra_json,
                embedding = excluded.embedding
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.metadata.source_file)
        .bind(&chunk.metadata.file_type)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(chunk.start as i64)
        .bind(chunk.end as i64)
        .bind(&chunk.hash)
        .bind(chunk.created_at)
        .bind(extra_json)
        .bind(vec_to_blob(&entry.vector))
        .execute(&mut **tx)
        .await
        .map_err(storage)?;
    }
    Ok(())
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    async fn upsert(&self, entries: &[EmbeddedChunk]) -> Result<()> {
        validate_batch(self.dims, entries, None)?;
        let mut tx = self.pool.begin().await.map_err(storage)?;
        insert_entries(&mut tx, entries).await?;
        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn replace_source(&self, source: &str, entries: &[EmbeddedChunk]) -> Result<()> {
        validate_batch(self.dims, entries, Some(source))?;
        let mut tx = self.pool.begin().await.map_err(storage)?;
        sqlx::query("DELETE FROM chunks WHERE source_file = ?")
            .bind(source)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        insert_entries(&mut tx, entries).await?;
        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<RetrievalResult> {
        validate_query(self.dims, vector, k)?;

        let sql = format!("SELECT {}, embedding FROM chunks ORDER BY seq", CHUNK_COLUMNS);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;

        let mut stored = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.try_get("embedding").map_err(storage)?;
            let vec = blob_to_vec(&blob);
            if vec.len() != self.dims {
                return Err(RagError::storage(format!(
                    "corrupt embedding: expected {} floats, found {}",
                    self.dims,
                    vec.len()
                )));
            }
            stored.push((row_to_chunk(row)?, vec));
        }

        let hits = rank_top_k(
            self.metric,
            vector,
            stored.iter().map(|(c, v)| (c, v.as_slice())),
            k,
            filter,
        );
        Ok(RetrievalResult {
            hits,
            skipped: false,
        })
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chunks WHERE source_file = ?")
            .bind(source)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected() as usize)
    }

    async fn documents(&self) -> Result<Vec<Document>> {
        let chunks = self.load_chunks().await?;
        Ok(group_documents(&chunks))
    }

    async fn stats(&self) -> Result<IndexStats> {
        let chunks = self.load_chunks().await?;
        Ok(compute_stats(self.dims, self.metric, &chunks))
    }

    async fn clear(&self) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chunks")
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected() as usize)
    }
}
