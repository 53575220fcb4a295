//! `dchat health`: check that the database, the index and the embedder
//! all answer.
//!
//! The embedder is exercised with one real retrieval, so a missing API key
//! or an unreachable endpoint shows up here rather than mid-conversation.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::pipeline::Pipeline;

const PROBE_QUERY: &str = "health check";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: &'static str,
    pub healthy: bool,
    pub detail: String,
}

impl Check {
    fn ok(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            healthy: true,
            detail: detail.into(),
        }
    }

    fn failed(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            healthy: false,
            detail: detail.into(),
        }
    }
}

/// Run every check against an open pipeline. Checks after a failing one
/// still run.
pub async fn check_health(pipeline: &Pipeline) -> Vec<Check> {
    let mut checks = Vec::new();

    let db = sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(pipeline.pool())
        .await;
    checks.push(match db {
        Ok(_) => Check::ok("database", pipeline.config().db.path.display().to_string()),
        Err(e) => Check::failed("database", e.to_string()),
    });

    let Ok(index) = pipeline.index() else {
        checks.push(Check::failed("index", "embedding provider is disabled"));
        return checks;
    };
    checks.push(match index.stats().await {
        Ok(stats) => Check::ok(
            "index",
            format!(
                "{} documents, {} chunks ({} dims, {})",
                stats.total_documents, stats.total_chunks, stats.dims, stats.metric
            ),
        ),
        Err(e) => Check::failed("index", e.to_string()),
    });

    let probe = match pipeline.retriever() {
        Ok(retriever) => retriever
            .retrieve(PROBE_QUERY, 1, None, true)
            .await
            .map_err(anyhow::Error::from),
        Err(e) => Err(e),
    };
    let model = pipeline.embedder().model_name().to_string();
    checks.push(match probe {
        Ok(result) => Check::ok(
            "embedder",
            format!("{} ({} hit for test query)", model, result.len()),
        ),
        Err(e) => Check::failed("embedder", format!("{}: {:#}", model, e)),
    });

    checks
}

pub async fn run_health(config: &Config) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;
    let checks = check_health(&pipeline).await;
    pipeline.close().await;

    println!("{:<12} {:<8} DETAIL", "CHECK", "STATUS");
    for check in &checks {
        let status = if check.healthy { "OK" } else { "FAIL" };
        println!("{:<12} {:<8} {}", check.name, status, check.detail);
    }
    println!("{:<12} {:<8} {}", "completion", "-", config.completion.provider);

    let failed = checks.iter().filter(|c| !c.healthy).count();
    if failed > 0 {
        bail!("{} health check(s) failed", failed);
    }
    Ok(())
}
