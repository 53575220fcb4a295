//! `dchat documents`: list, show, delete and clear documents.

use anyhow::{bail, Result};

use docchat_core::chunk::reconstruct;

use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::sqlite_index::source_chunks;

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

pub async fn run_list(config: &Config) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;
    let docs = pipeline.index()?.documents().await?;

    if docs.is_empty() {
        println!("No documents.");
    } else {
        println!("  {:<40} {:<8} {:>7}   {}", "SOURCE", "TYPE", "CHUNKS", "ADDED");
        println!("  {}", "-".repeat(76));
        for doc in &docs {
            println!(
                "  {:<40} {:<8} {:>7}   {}",
                doc.id,
                doc.file_type,
                doc.chunk_count,
                format_ts(doc.created_at)
            );
        }
        println!();
        println!("  {} documents", docs.len());
    }

    pipeline.close().await;
    Ok(())
}

/// Print one document, rebuilt from its chunks.
pub async fn run_show(config: &Config, source: &str) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;
    let docs = pipeline.index()?.documents().await?;
    let Some(doc) = docs.iter().find(|d| d.id == source) else {
        bail!("No document named '{}'", source);
    };
    let chunks = source_chunks(pipeline.pool(), source).await?;

    println!("--- Document ---");
    println!("source:     {}", doc.id);
    println!("file_type:  {}", doc.file_type);
    println!("added:      {}", format_ts(doc.created_at));
    println!("chunks:     {}", doc.chunk_count);
    println!();
    println!("--- Text ---");
    println!("{}", reconstruct(&chunks));

    pipeline.close().await;
    Ok(())
}

pub async fn run_delete(config: &Config, source: &str) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;
    let removed = pipeline.index()?.delete_by_source(source).await?;
    if removed == 0 {
        println!("No chunks found for '{}'.", source);
    } else {
        println!("Deleted '{}' ({} chunks).", source, removed);
    }
    pipeline.close().await;
    Ok(())
}

pub async fn run_clear(config: &Config, yes: bool) -> Result<()> {
    if !yes {
        bail!("Refusing to clear the collection without --yes");
    }
    let pipeline = Pipeline::open(config).await?;
    let removed = pipeline.index()?.clear().await?;
    println!("Cleared collection ({} chunks removed).", removed);
    pipeline.close().await;
    Ok(())
}
