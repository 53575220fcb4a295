//! `dchat session ...`: create, list, inspect and clear conversations.

use std::sync::Arc;

use anyhow::Result;

use docchat_core::session::Message;

use crate::completion::DisabledProvider;
use crate::config::Config;
use crate::pipeline::Pipeline;

fn format_ts(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub async fn run_new(config: &Config) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;
    let session = pipeline.sessions().create(config.session_settings()).await?;
    println!("{}", session.id);
    pipeline.close().await;
    Ok(())
}

pub async fn run_list(config: &Config) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;
    let sessions = pipeline.sessions().list().await?;

    if sessions.is_empty() {
        println!("No sessions.");
    } else {
        println!("  {:<36}  {:<19}  {:>5}  {}", "SESSION", "CREATED", "MSGS", "LAST MESSAGE");
        println!("  {}", "-".repeat(90));
        for s in &sessions {
            println!(
                "  {:<36}  {:<19}  {:>5}  {}",
                s.id,
                format_ts(&s.created_at),
                s.message_count,
                s.last_message_preview.as_deref().unwrap_or("")
            );
        }
    }

    pipeline.close().await;
    Ok(())
}

/// Print one message the way `history` shows it.
pub fn print_message(msg: &Message) {
    println!("[{}] {}:", format_ts(&msg.timestamp), msg.role.as_str().to_uppercase());
    println!("{}", msg.content);
    if let Some(meta) = &msg.metadata {
        if !meta.sources.is_empty() {
            println!("  sources: {}", meta.sources.join(", "));
        }
    }
    println!();
}

pub async fn run_history(config: &Config, session_id: &str, limit: Option<usize>) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;
    let session = pipeline.sessions().get(session_id).await?;

    let messages = session.history(limit);
    if messages.is_empty() {
        println!("No messages.");
    }
    for msg in messages {
        print_message(msg);
    }

    pipeline.close().await;
    Ok(())
}

pub async fn run_stats(config: &Config, session_id: &str) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;
    let session = pipeline.sessions().get(session_id).await?;
    let stats = session.statistics();

    println!("Session {}", stats.session_id);
    println!("  created:    {}", format_ts(&stats.created_at));
    println!("  updated:    {}", format_ts(&stats.updated_at));
    println!("  messages:   {}", stats.total_messages);
    println!("    user:      {}", stats.user_messages);
    println!("    assistant: {}", stats.assistant_messages);
    println!("    system:    {}", stats.system_messages);
    println!("  tokens:     {}", stats.total_tokens);
    println!("  model:      {}", session.settings.model);

    pipeline.close().await;
    Ok(())
}

/// Start a fresh session with the settings of `session_id`. The old
/// history stays in the database.
pub async fn run_clear(config: &Config, session_id: &str) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;
    let orchestrator = pipeline.orchestrator(Arc::new(DisabledProvider))?;
    let session = orchestrator.clear_session(session_id).await?;
    println!("{}", session.id);
    pipeline.close().await;
    Ok(())
}
