//! Error taxonomy for the RAG pipeline.
//!
//! Every fallible operation in this crate returns [`Result`]. The variants
//! map one-to-one onto the failure classes callers need to tell apart:
//!
//! | Variant | Raised by | Caller treatment |
//! |---------|-----------|------------------|
//! | [`Configuration`](RagError::Configuration) | constructors, invalid arguments | fatal, fix the config |
//! | [`DimensionMismatch`](RagError::DimensionMismatch) | vector index | fail the single operation |
//! | [`Storage`](RagError::Storage) | vector index, session store | fail the single operation |
//! | [`EmbeddingUnavailable`](RagError::EmbeddingUnavailable) | embedder, retriever, ingestion | user-visible, retry later |
//! | [`Provider`](RagError::Provider) | completion provider | user-visible, retry later |
//! | [`SessionNotFound`](RagError::SessionNotFound) | session store | caller bug, surfaced verbatim |
//!
//! Nothing in this crate retries on its own.

use thiserror::Error;

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),
}

impl RagError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn storage(msg: impl std::fmt::Display) -> Self {
        Self::Storage(msg.to_string())
    }

    /// Short machine-readable name of the variant, used in events and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::Storage(_) => "storage",
            Self::EmbeddingUnavailable(_) => "embedding_unavailable",
            Self::Provider(_) => "provider",
            Self::SessionNotFound(_) => "session_not_found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_dimensions() {
        let err = RagError::DimensionMismatch {
            expected: 384,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "dimension mismatch: index expects 384, got 3"
        );
        assert_eq!(err.kind(), "dimension_mismatch");
    }

    #[test]
    fn test_session_not_found_is_verbatim() {
        let err = RagError::SessionNotFound("abc".into());
        assert_eq!(err.to_string(), "session not found: abc");
    }
}
