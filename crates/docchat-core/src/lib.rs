//! # DocChat Core
//!
//! The retrieval-augmented generation pipeline behind DocChat: chunking,
//! vector indexing and similarity search, prompt assembly, sessions and the
//! conversation orchestrator.
//!
//! This crate has no sqlx, HTTP client or filesystem I/O. Storage and model
//! providers plug in through traits:
//!
//! | Trait | Implementations here | In the `docchat` app |
//! |-------|----------------------|----------------------|
//! | [`store::VectorIndex`] | [`store::memory::InMemoryVectorIndex`] | SQLite |
//! | [`session::SessionStore`] | [`session::memory::InMemorySessionStore`] | SQLite |
//! | [`embedding::EmbeddingProvider`] | none | OpenAI, local hashing |
//! | [`completion::CompletionProvider`] | none | Anthropic, OpenAI-compatible, echo |
//!
//! ## Data flow
//!
//! ```text
//! write:  text ─▶ Chunker ─▶ Embedder ─▶ VectorIndex            (ingest)
//! read:   message ─▶ Retriever ─▶ ContextAssembler ─▶ Completion ─▶ SessionStore
//!                                                                  (chat)
//! ```

pub mod chat;
pub mod chunk;
pub mod completion;
pub mod context;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod models;
pub mod retrieve;
pub mod session;
pub mod store;

pub use error::{RagError, Result};
