//! Typed metadata filters for vector index queries.
//!
//! A [`MetadataFilter`] is a small expression tree over the declared chunk
//! metadata fields. Every index implementation evaluates it with
//! [`MetadataFilter::matches`], so in-memory and SQLite backends agree on
//! semantics.

use serde::{Deserialize, Serialize};

use crate::models::ChunkMetadata;

/// A metadata field a filter can test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    SourceFile,
    FileType,
    /// A key in [`ChunkMetadata::extra`].
    Custom(String),
}

impl MetadataField {
    fn read<'a>(&self, meta: &'a ChunkMetadata) -> Option<&'a str> {
        match self {
            MetadataField::SourceFile => Some(meta.source_file.as_str()),
            MetadataField::FileType => Some(meta.file_type.as_str()),
            MetadataField::Custom(key) => meta.extra.get(key).map(String::as_str),
        }
    }
}

/// Predicate over [`ChunkMetadata`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataFilter {
    /// Field equals value exactly.
    Eq(MetadataField, String),
    /// Field contains value as a substring.
    Contains(MetadataField, String),
    /// Every sub-filter matches. An empty list matches everything.
    All(Vec<MetadataFilter>),
    /// At least one sub-filter matches. An empty list matches nothing.
    Any(Vec<MetadataFilter>),
}

impl MetadataFilter {
    pub fn source(source_file: impl Into<String>) -> Self {
        MetadataFilter::Eq(MetadataField::SourceFile, source_file.into())
    }

    pub fn file_type(file_type: impl Into<String>) -> Self {
        MetadataFilter::Eq(MetadataField::FileType, file_type.into())
    }

    /// Evaluate the filter. A missing custom field never matches.
    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        match self {
            MetadataFilter::Eq(field, value) => field.read(meta) == Some(value.as_str()),
            MetadataFilter::Contains(field, value) => field
                .read(meta)
                .map(|v| v.contains(value.as_str()))
                .unwrap_or(false),
            MetadataFilter::All(filters) => filters.iter().all(|f| f.matches(meta)),
            MetadataFilter::Any(filters) => filters.iter().any(|f| f.matches(meta)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn meta() -> ChunkMetadata {
        let mut extra = BTreeMap::new();
        extra.insert("lang".to_string(), "en-GB".to_string());
        ChunkMetadata {
            source_file: "handbook.pdf".to_string(),
            file_type: "pdf".to_string(),
            chunk_index: 3,
            extra,
        }
    }

    #[test]
    fn test_eq_fields() {
        assert!(MetadataFilter::source("handbook.pdf").matches(&meta()));
        assert!(!MetadataFilter::source("other.pdf").matches(&meta()));
        assert!(MetadataFilter::file_type("pdf").matches(&meta()));
    }

    #[test]
    fn test_contains_and_custom() {
        let f = MetadataFilter::Contains(MetadataField::Custom("lang".into()), "en".into());
        assert!(f.matches(&meta()));
        let missing = MetadataFilter::Eq(MetadataField::Custom("author".into()), "x".into());
        assert!(!missing.matches(&meta()));
    }

    #[test]
    fn test_combinators() {
        let all = MetadataFilter::All(vec![
            MetadataFilter::file_type("pdf"),
            MetadataFilter::Contains(MetadataField::SourceFile, "hand".into()),
        ]);
        assert!(all.matches(&meta()));

        let any = MetadataFilter::Any(vec![
            MetadataFilter::file_type("txt"),
            MetadataFilter::source("handbook.pdf"),
        ]);
        assert!(any.matches(&meta()));

        assert!(MetadataFilter::All(vec![]).matches(&meta()));
        assert!(!MetadataFilter::Any(vec![]).matches(&meta()));
    }
}
