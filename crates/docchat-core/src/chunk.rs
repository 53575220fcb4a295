//! Fixed-width sliding-window text chunker.
//!
//! Splits extracted document text into overlapping [`Chunk`]s of at most
//! `chunk_size` characters. Consecutive chunks share exactly `overlap`
//! characters, so the original text can always be rebuilt from the chunks
//! (see [`reconstruct`]).
//!
//! Each chunk gets a deterministic id derived from its source and index,
//! plus a SHA-256 hash of its text.
//!
//! # Algorithm
//!
//! 1. Index the text by character (not byte) so multi-byte UTF-8 input is
//!    never split inside a code point.
//! 2. Emit the window `[start, min(start + chunk_size, len))`.
//! 3. Stop once a window reaches the end of the text, otherwise advance
//!    `start` by `chunk_size - overlap` and repeat.
//! 4. Empty text yields no chunks.
//!
//! Whitespace is kept verbatim; there is no sentence or paragraph awareness.
//!
//! # Example
//!
//! ```rust
//! use docchat_core::chunk::Chunker;
//! use docchat_core::models::SourceInfo;
//!
//! let chunker = Chunker::new(1000, 200).unwrap();
//! let text = "x".repeat(2500);
//! let chunks = chunker.chunk(&SourceInfo::new("notes.txt", "txt"), &text);
//! let spans: Vec<_> = chunks.iter().map(|c| (c.start, c.end)).collect();
//! assert_eq!(spans, vec![(0, 1000), (800, 1800), (1600, 2500)]);
//! ```

use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};
use crate::models::{Chunk, ChunkMetadata, SourceInfo};

/// Sliding-window chunker. Construction validates the window parameters,
/// so a built `Chunker` can never fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker.
    ///
    /// # Errors
    ///
    /// [`RagError::Configuration`] when `chunk_size == 0` or
    /// `overlap >= chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::config("chunk_size must be > 0"));
        }
        if overlap >= chunk_size {
            return Err(RagError::config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between consecutive window starts.
    pub fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }

    /// Split `text` into chunks tagged with `source`.
    ///
    /// # Guarantees
    ///
    /// - Indices are contiguous: `0, 1, 2, …, N-1`.
    /// - `end - start <= chunk_size` for every chunk.
    /// - Chunk `i + 1` starts exactly `overlap` characters before chunk `i` ends.
    pub fn chunk(&self, source: &SourceInfo, text: &str) -> Vec<Chunk> {
        // Byte offset of every char, plus the end of the string.
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_len = bounds.len() - 1;

        let created_at = chrono::Utc::now().timestamp();
        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < char_len {
            let end = (start + self.chunk_size).min(char_len);
            let slice = &text[bounds[start]..bounds[end]];
            chunks.push(make_chunk(source, chunks.len() as i64, slice, start, end, created_at));
            if end == char_len {
                break;
            }
            start += self.step();
        }

        chunks
    }
}

/// Rebuild the source text from its chunks.
///
/// Chunks must be in index order. Overlap is taken from the stored spans:
/// each chunk contributes only the characters past the end of the text
/// rebuilt so far, so the result does not depend on the chunker settings
/// currently configured.
pub fn reconstruct(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;
    for chunk in chunks {
        if chunk.end <= covered {
            continue;
        }
        let skip = covered.saturating_sub(chunk.start);
        out.extend(chunk.text.chars().skip(skip));
        covered = chunk.end;
    }
    out
}

/// Deterministic chunk id: `"{source_file}#{index}"`.
pub fn chunk_id(source_file: &str, index: i64) -> String {
    format!("{}#{}", source_file, index)
}

/// SHA-256 of `text`, hex encoded.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn make_chunk(
    source: &SourceInfo,
    index: i64,
    text: &str,
    start: usize,
    end: usize,
    created_at: i64,
) -> Chunk {
    Chunk {
        id: chunk_id(&source.source_file, index),
        document_id: source.source_file.clone(),
        chunk_index: index,
        text: text.to_string(),
        start,
        end,
        hash: content_hash(text),
        created_at,
        metadata: ChunkMetadata {
            source_file: source.source_file.clone(),
            file_type: source.file_type.clone(),
            chunk_index: index,
            extra: source.extra.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src() -> SourceInfo {
        SourceInfo::new("doc.txt", "txt")
    }

    #[test]
    fn test_reference_scenario_2500_chars() {
        let chunker = Chunker::new(1000, 200).unwrap();
        let text = "abcdefghij".repeat(250);
        let chunks = chunker.chunk(&src(), &text);

        let lens: Vec<usize> = chunks.iter().map(|c| c.text.chars().count()).collect();
        assert_eq!(lens, vec![1000, 1000, 700]);
        let spans: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(spans, vec![(0, 1000), (800, 1800), (1600, 2500)]);
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        let chunker = Chunker::new(100, 10).unwrap();
        assert!(chunker.chunk(&src(), "").is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            Chunker::new(0, 0),
            Err(RagError::Configuration(_))
        ));
        assert!(matches!(
            Chunker::new(100, 100),
            Err(RagError::Configuration(_))
        ));
        assert!(matches!(
            Chunker::new(100, 250),
            Err(RagError::Configuration(_))
        ));
        assert!(Chunker::new(100, 99).is_ok());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = Chunker::new(1000, 200).unwrap();
        let chunks = chunker.chunk(&src(), "Hello, world!");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!((chunks[0].start, chunks[0].end), (0, 13));
    }

    #[test]
    fn test_reconstruction_across_parameters() {
        let text = "The quick brown fox jumps over the lazy dog.\n\n  Whitespace   kept.\t\n";
        for size in 1..20 {
            for overlap in 0..size {
                let chunker = Chunker::new(size, overlap).unwrap();
                let chunks = chunker.chunk(&src(), text);
                assert_eq!(
                    reconstruct(&chunks),
                    text,
                    "size={} overlap={}",
                    size,
                    overlap
                );
                for c in &chunks {
                    assert!(c.len_chars() <= size);
                }
            }
        }
    }

    #[test]
    fn test_reconstruct_mixed_overlaps() {
        let text = "Leave requests go to your manager two weeks in advance.";
        let wide = Chunker::new(20, 8).unwrap().chunk(&src(), text);
        let none = Chunker::new(20, 0).unwrap().chunk(&src(), text);
        assert_eq!(reconstruct(&wide), text);
        assert_eq!(reconstruct(&none), text);
        assert_eq!(reconstruct(&[]), "");
    }

    #[test]
    fn test_consecutive_chunks_overlap_exactly() {
        let chunker = Chunker::new(7, 3).unwrap();
        let text = "0123456789abcdefghijklmnopq";
        let chunks = chunker.chunk(&src(), text);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end - pair[1].start, 3);
            let tail: String = pair[0].text.chars().skip(pair[0].len_chars() - 3).collect();
            let head: String = pair[1].text.chars().take(3).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_multibyte_utf8_spans_are_chars() {
        let chunker = Chunker::new(4, 1).unwrap();
        let text = "┌──┐│héllo│└──┘";
        let chunks = chunker.chunk(&src(), text);
        assert_eq!(reconstruct(&chunks), text);
        for c in &chunks {
            assert_eq!(c.text.chars().count(), c.end - c.start);
        }
    }

    #[test]
    fn test_metadata_and_ids() {
        let chunker = Chunker::new(5, 0).unwrap();
        let source = SourceInfo::new("guide.md", "markdown").with_extra("lang", "en");
        let chunks = chunker.chunk(&source, "aaaaabbbbbcc");
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert_eq!(c.metadata.chunk_index, i as i64);
            assert_eq!(c.id, format!("guide.md#{}", i));
            assert_eq!(c.document_id, "guide.md");
            assert_eq!(c.metadata.file_type, "markdown");
            assert_eq!(c.metadata.extra.get("lang").map(String::as_str), Some("en"));
            assert_eq!(c.hash, content_hash(&c.text));
        }
    }

    #[test]
    fn test_deterministic() {
        let chunker = Chunker::new(6, 2).unwrap();
        let text = "Alpha Beta Gamma Delta";
        let c1 = chunker.chunk(&src(), text);
        let c2 = chunker.chunk(&src(), text);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
        }
    }
}
