//! `dchat stats`: what is in the collection.

use anyhow::Result;

use crate::config::Config;
use crate::pipeline::Pipeline;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;
    let stats = pipeline.index()?.stats().await?;

    let session_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
        .fetch_one(pipeline.pool())
        .await?;
    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("DocChat Collection Stats");
    println!("========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", stats.total_documents);
    println!("  Chunks:      {}", stats.total_chunks);
    println!("  Avg chunk:   {:.0} chars", stats.average_chunk_chars);
    println!(
        "  Embeddings:  {} ({} dims, {})",
        pipeline.embedder().model_name(),
        stats.dims,
        stats.metric
    );
    println!("  Sessions:    {}", session_count);

    if !stats.file_types.is_empty() {
        println!();
        println!("  By file type:");
        println!("  {:<12} {:>8}", "TYPE", "CHUNKS");
        println!("  {}", "-".repeat(21));
        for (file_type, count) in &stats.file_types {
            println!("  {:<12} {:>8}", file_type, count);
        }
    }
    println!();

    pipeline.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
