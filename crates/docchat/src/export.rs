//! `dchat export`: write a conversation out as JSON, plain text or
//! Markdown.
//!
//! If `output` is given the rendered conversation is written to that file,
//! otherwise to stdout for piping.

use std::path::Path;

use anyhow::Result;
use clap::ValueEnum;

use docchat_core::models::Role;
use docchat_core::session::Session;

use crate::config::Config;
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Txt,
    Md,
}

fn format_ts(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn role_title(role: Role) -> &'static str {
    match role {
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::System => "System",
    }
}

/// Render a session in the requested format.
pub fn render(session: &Session, format: ExportFormat) -> Result<String> {
    let out = match format {
        ExportFormat::Json => serde_json::to_string_pretty(session)?,
        ExportFormat::Txt => {
            let mut lines = vec![
                format!("Chat Session: {}", session.id),
                format!("Created: {}", session.created_at.to_rfc3339()),
                format!("Updated: {}", session.updated_at().to_rfc3339()),
                "-".repeat(50),
            ];
            for msg in &session.messages {
                lines.push(format!(
                    "\n[{}] {}:",
                    format_ts(&msg.timestamp),
                    msg.role.as_str().to_uppercase()
                ));
                lines.push(msg.content.clone());
            }
            lines.join("\n")
        }
        ExportFormat::Md => {
            let mut lines = vec![
                format!("# Chat Session: {}", session.id),
                format!("**Created:** {}", session.created_at.to_rfc3339()),
                format!("**Updated:** {}", session.updated_at().to_rfc3339()),
                String::new(),
            ];
            for msg in &session.messages {
                lines.push(format!(
                    "## {} - {}",
                    role_title(msg.role),
                    format_ts(&msg.timestamp)
                ));
                lines.push(String::new());
                lines.push(msg.content.clone());
                lines.push(String::new());
                if let Some(meta) = msg.metadata.as_ref().filter(|m| !m.sources.is_empty()) {
                    lines.push(format!("*Sources: {}*", meta.sources.join(", ")));
                    lines.push(String::new());
                }
            }
            lines.join("\n")
        }
    };
    Ok(out)
}

pub async fn run_export(
    config: &Config,
    session_id: &str,
    format: ExportFormat,
    output: Option<&Path>,
) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;
    let session = pipeline.sessions().get(session_id).await?;
    let rendered = render(&session, format)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &rendered)?;
            eprintln!(
                "Exported {} messages to {}",
                session.messages.len(),
                path.display()
            );
        }
        None => {
            println!("{}", rendered);
        }
    }

    pipeline.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_core::session::{Message, MessageMetadata, SessionSettings};

    fn session() -> Session {
        let mut s = Session::new(SessionSettings::default());
        s.messages.push(Message::user("What is the leave policy?"));
        s.messages.push(Message::assistant(
            "25 days per year.",
            MessageMetadata {
                retrieved_chunks: 1,
                sources: vec!["handbook.md".into()],
                ..Default::default()
            },
        ));
        s
    }

    #[test]
    fn test_json_parses_back() {
        let s = session();
        let out = render(&s, ExportFormat::Json).unwrap();
        let back: Session = serde_json::from_str(&out).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_txt_layout() {
        let s = session();
        let out = render(&s, ExportFormat::Txt).unwrap();
        assert!(out.starts_with(&format!("Chat Session: {}", s.id)));
        assert!(out.contains("USER:\nWhat is the leave policy?"));
        assert!(out.contains("ASSISTANT:\n25 days per year."));
    }

    #[test]
    fn test_md_includes_sources() {
        let out = render(&session(), ExportFormat::Md).unwrap();
        assert!(out.starts_with("# Chat Session: "));
        assert!(out.contains("## User - "));
        assert!(out.contains("*Sources: handbook.md*"));
    }
}
