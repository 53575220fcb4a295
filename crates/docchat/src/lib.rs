//! # DocChat
//!
//! **Chat with a private document collection.**
//!
//! DocChat ingests text documents, splits them into overlapping chunks,
//! embeds them into a SQLite-backed vector index, and answers questions
//! with an LLM whose prompt carries the most relevant chunks. Every answer
//! records which documents it drew on.
//!
//! The retrieval-augmented pipeline itself lives in `docchat-core`; this
//! crate supplies the storage, the HTTP providers, configuration and the
//! `dchat` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌────────────┐
//! │   Files     │──▶│   Ingest    │──▶│   SQLite   │
//! │ md/txt/...  │   │ Chunk+Embed │   │ chunks+vec │
//! └─────────────┘   └─────────────┘   └─────┬──────┘
//!                                           │ retrieve
//!                   ┌─────────────┐   ┌─────▼──────┐
//!                   │  Sessions   │◀─▶│Orchestrator│──▶ LLM
//!                   │  (SQLite)   │   │            │
//!                   └─────────────┘   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dchat init                          # create database
//! dchat ingest ./docs                 # chunk and embed a directory
//! dchat search "annual leave"         # semantic search
//! dchat chat                          # interactive conversation
//! dchat export <session> --format md  # save a conversation
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and validation |
//! | [`db`], [`migrate`] | SQLite pool and schema |
//! | [`sqlite_index`] | [`VectorIndex`](docchat_core::store::VectorIndex) over SQLite |
//! | [`sqlite_sessions`] | [`SessionStore`](docchat_core::session::SessionStore) over SQLite |
//! | [`embedding`] | Embedding providers (OpenAI, hash) |
//! | [`completion`] | Completion providers (Anthropic, OpenAI, echo) |
//! | [`pipeline`] | Builds core components from a [`config::Config`] |
//! | [`ingest`], [`search`], [`documents`], [`stats`], [`health`] | Collection commands |
//! | [`chat_cmd`], [`sessions`], [`export`] | Conversation commands |

pub mod chat_cmd;
pub mod completion;
pub mod config;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod export;
pub mod health;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod pipeline;
pub mod search;
pub mod sessions;
pub mod sqlite_index;
pub mod sqlite_sessions;
pub mod stats;
