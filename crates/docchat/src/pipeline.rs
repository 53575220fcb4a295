//! Wiring: build the core pipeline components from a [`Config`].
//!
//! Every command opens one [`Pipeline`], which owns the SQLite pool and the
//! SQLite-backed index and session store, and hands out ingestors,
//! retrievers and orchestrators configured from the TOML file.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use sqlx::SqlitePool;

use docchat_core::chat::Orchestrator;
use docchat_core::chunk::Chunker;
use docchat_core::completion::CompletionProvider;
use docchat_core::context::ContextAssembler;
use docchat_core::embedding::EmbeddingProvider;
use docchat_core::ingest::Ingestor;
use docchat_core::retrieve::Retriever;
use docchat_core::session::SessionStore;
use docchat_core::store::memory::InMemoryVectorIndex;
use docchat_core::store::VectorIndex;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::sqlite_index::SqliteVectorIndex;
use crate::sqlite_sessions::SqliteSessionStore;

pub struct Pipeline {
    config: Config,
    pool: SqlitePool,
    embedder: Arc<dyn EmbeddingProvider>,
    /// `None` when no embedding provider is configured.
    index: Option<Arc<dyn VectorIndex>>,
    sessions: Arc<dyn SessionStore>,
}

impl Pipeline {
    /// Connect, migrate, and open the index and session store.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::open(config).await?;
        let embedder = embedding::create_provider(&config.embedding)?;

        let index: Option<Arc<dyn VectorIndex>> = if config.embedding.is_enabled() {
            let index =
                SqliteVectorIndex::open(pool.clone(), embedder.dims(), config.retrieval.metric)
                    .await
                    .context("Failed to open vector index")?;
            Some(Arc::new(index))
        } else {
            None
        };

        Ok(Self {
            config: config.clone(),
            sessions: Arc::new(SqliteSessionStore::new(pool.clone())),
            pool,
            embedder,
            index,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// The document index. Fails when embeddings are disabled.
    pub fn index(&self) -> Result<&Arc<dyn VectorIndex>> {
        match &self.index {
            Some(index) => Ok(index),
            None => bail!(
                "Embedding provider is disabled. Set [embedding] provider in config \
                 to work with the document collection."
            ),
        }
    }

    pub fn ingestor(&self) -> Result<Ingestor> {
        let chunker = Chunker::new(self.config.chunking.chunk_size, self.config.chunking.overlap)?;
        let ingestor = Ingestor::new(chunker, self.embedder.clone(), self.index()?.clone())?
            .with_batch_size(self.config.embedding.batch_size);
        Ok(ingestor)
    }

    pub fn retriever(&self) -> Result<Retriever> {
        let index: Arc<dyn VectorIndex> = match &self.index {
            Some(index) => index.clone(),
            // Never queried: chat without an index only runs with RAG off.
            None => Arc::new(InMemoryVectorIndex::new(1, self.config.retrieval.metric)?),
        };
        Ok(Retriever::new(self.embedder.clone(), index)
            .with_embed_timeout(Duration::from_secs(self.config.embedding.timeout_secs)))
    }

    pub fn assembler(&self) -> ContextAssembler {
        let retrieval = &self.config.retrieval;
        let mut assembler = ContextAssembler::new();
        if let Some(limit) = retrieval.chunk_char_limit.filter(|l| *l > 0) {
            assembler = assembler.with_chunk_char_limit(limit);
        }
        if let Some(notice) = &retrieval.empty_context_notice {
            assembler = assembler.with_empty_context_notice(notice.clone());
        }
        assembler
    }

    pub fn orchestrator(&self, completion: Arc<dyn CompletionProvider>) -> Result<Orchestrator> {
        Ok(Orchestrator::new(self.sessions.clone(), self.retriever()?, completion)
            .with_assembler(self.assembler())
            .with_empty_retrieval_policy(self.config.retrieval.empty_result_policy)
            .with_completion_timeout(Duration::from_secs(self.config.completion.timeout_secs)))
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
