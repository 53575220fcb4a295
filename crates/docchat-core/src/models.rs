//! Core data models shared by every stage of the pipeline.
//!
//! These types flow from the chunker into the vector index (write path)
//! and back out through the retriever into prompts (read path).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RagError;

/// Where a piece of text came from. Passed to the chunker and copied into
/// every chunk's [`ChunkMetadata`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Source filename; also the document identity.
    pub source_file: String,
    /// File type label (`pdf`, `txt`, `markdown`, ...).
    pub file_type: String,
    /// Free-form string metadata carried through to every chunk.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl SourceInfo {
    pub fn new(source_file: impl Into<String>, file_type: impl Into<String>) -> Self {
        Self {
            source_file: source_file.into(),
            file_type: file_type.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Metadata attached to each chunk, queryable through
/// [`MetadataFilter`](crate::filter::MetadataFilter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_file: String,
    pub file_type: String,
    pub chunk_index: i64,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// A contiguous slice of a document's text, the unit of retrieval.
///
/// `start` and `end` are character offsets (Unicode scalar values) into the
/// source text, half-open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub start: usize,
    pub end: usize,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
    /// Unix seconds.
    pub created_at: i64,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Number of characters covered by the span. A corrupt span with
    /// `end < start` counts as empty.
    pub fn len_chars(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

/// A chunk paired with its embedding, as written to a vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A document in the collection, derived from the chunks sharing its
/// source filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Source filename.
    pub id: String,
    pub file_type: String,
    /// Unix seconds of the earliest chunk.
    pub created_at: i64,
    /// Chunk ids in reconstruction order.
    pub chunk_ids: Vec<String>,
    pub chunk_count: usize,
}

/// Speaker of a message or prompt segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(RagError::Storage(format!("unknown message role: {}", other))),
        }
    }
}

/// Token counts reported by the completion provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens as u64 + self.output_tokens as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip_str() {
        for role in [Role::User, Role::Assistant, Role::System] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("moderator".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_len_chars_of_inverted_span_is_zero() {
        let chunk = Chunk {
            id: "a.txt#0".into(),
            document_id: "a.txt".into(),
            chunk_index: 0,
            text: "abc".into(),
            start: 10,
            end: 4,
            hash: String::new(),
            created_at: 0,
            metadata: ChunkMetadata {
                source_file: "a.txt".into(),
                file_type: "txt".into(),
                chunk_index: 0,
                extra: BTreeMap::new(),
            },
        };
        assert_eq!(chunk.len_chars(), 0);
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage {
            input_tokens: 120,
            output_tokens: 30,
        };
        assert_eq!(usage.total(), 150);
    }
}
