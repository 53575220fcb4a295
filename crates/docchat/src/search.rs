//! `dchat search`: semantic search over the collection without chatting.

use anyhow::Result;
use serde::Serialize;

use docchat_core::filter::MetadataFilter;
use docchat_core::store::RetrievalResult;

use crate::config::Config;
use crate::pipeline::Pipeline;

const SNIPPET_CHARS: usize = 240;

#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub rank: usize,
    pub source_file: String,
    pub file_type: String,
    pub chunk_index: i64,
    pub distance: f32,
    pub snippet: String,
}

/// Combine the optional `--source` / `--file-type` flags into one filter.
pub fn build_filter(source: Option<&str>, file_type: Option<&str>) -> Option<MetadataFilter> {
    let mut parts = Vec::new();
    if let Some(s) = source {
        parts.push(MetadataFilter::source(s));
    }
    if let Some(t) = file_type {
        parts.push(MetadataFilter::file_type(t));
    }
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(MetadataFilter::All(parts)),
    }
}

fn snippet(text: &str) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > SNIPPET_CHARS {
        let mut s: String = flat.chars().take(SNIPPET_CHARS).collect();
        s.push_str("...");
        s
    } else {
        flat
    }
}

pub fn to_hits(result: &RetrievalResult) -> Vec<SearchHit> {
    result
        .hits
        .iter()
        .enumerate()
        .map(|(i, hit)| SearchHit {
            rank: i + 1,
            source_file: hit.chunk.metadata.source_file.clone(),
            file_type: hit.chunk.metadata.file_type.clone(),
            chunk_index: hit.chunk.chunk_index,
            distance: hit.distance,
            snippet: snippet(&hit.chunk.text),
        })
        .collect()
}

pub async fn run_search(
    config: &Config,
    query: &str,
    limit: Option<usize>,
    source: Option<&str>,
    file_type: Option<&str>,
    json: bool,
) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;
    pipeline.index()?;
    let retriever = pipeline.retriever()?;

    let k = limit.unwrap_or(config.retrieval.top_k);
    let filter = build_filter(source, file_type);
    let result = retriever.retrieve(query, k, filter.as_ref(), true).await?;
    let hits = to_hits(&result);

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else if hits.is_empty() {
        println!("No results.");
    } else {
        for hit in &hits {
            println!(
                "{}. [{:.4}] {} (chunk {}, {})",
                hit.rank, hit.distance, hit.source_file, hit.chunk_index, hit.file_type
            );
            println!("    {}", hit.snippet);
            println!();
        }
    }

    pipeline.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter() {
        assert!(build_filter(None, None).is_none());
        assert_eq!(
            build_filter(Some("a.md"), None),
            Some(MetadataFilter::source("a.md"))
        );
        assert!(matches!(
            build_filter(Some("a.md"), Some("md")),
            Some(MetadataFilter::All(ref parts)) if parts.len() == 2
        ));
    }

    #[test]
    fn test_snippet_flattens_and_truncates() {
        assert_eq!(snippet("one\n\ntwo   three"), "one two three");
        let long = "word ".repeat(100);
        assert!(snippet(&long).ends_with("..."));
    }
}
