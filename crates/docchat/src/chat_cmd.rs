//! `dchat chat`: talk to the document collection.
//!
//! With `--message` one turn is run and the process exits; otherwise lines
//! are read from stdin until EOF or `/quit`. `/clear` starts a fresh
//! session with the same settings.

use std::io::Write;

use anyhow::{bail, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use docchat_core::chat::{ChatReply, ChatRequest, Orchestrator};

use crate::completion;
use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::search::build_filter;

/// Options of one `dchat chat` invocation.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub session: Option<String>,
    pub message: Option<String>,
    pub no_rag: bool,
    pub source: Option<String>,
    pub file_type: Option<String>,
    pub rag_query: Option<String>,
}

impl ChatOptions {
    fn request(&self, session_id: &str, message: &str) -> ChatRequest {
        let mut request = ChatRequest::new(session_id, message).with_rag(!self.no_rag);
        if let Some(filter) = build_filter(self.source.as_deref(), self.file_type.as_deref()) {
            request = request.with_filter(filter);
        }
        if let Some(q) = &self.rag_query {
            request = request.with_rag_query(q.clone());
        }
        request
    }
}

fn print_reply(reply: &ChatReply) {
    println!("{}", reply.text);
    if !reply.sources.is_empty() {
        println!();
        println!("Sources: {}", reply.sources.join(", "));
    }
    if reply.dropped_history > 0 {
        tracing::debug!(
            dropped = reply.dropped_history,
            "older history left out of the prompt"
        );
    }
}

async fn turn(
    orchestrator: &Orchestrator,
    options: &ChatOptions,
    session_id: &str,
    message: &str,
) -> Result<()> {
    let reply = orchestrator.chat(options.request(session_id, message)).await?;
    print_reply(&reply);
    Ok(())
}

pub async fn run_chat(config: &Config, options: &ChatOptions) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;
    if !options.no_rag && !pipeline.has_index() {
        bail!(
            "Embedding provider is disabled, so documents cannot be retrieved. \
             Configure [embedding] or pass --no-rag."
        );
    }

    let provider = completion::create_provider(&config.completion)?;
    let orchestrator = pipeline.orchestrator(provider)?;

    let mut session_id = match &options.session {
        Some(id) => orchestrator.sessions().get(id).await?.id,
        None => {
            let session = orchestrator.create_session(config.session_settings()).await?;
            eprintln!("Session: {}", session.id);
            session.id
        }
    };

    if let Some(message) = &options.message {
        let result = turn(&orchestrator, options, &session_id, message).await;
        pipeline.close().await;
        return result;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                let session = orchestrator.clear_session(&session_id).await?;
                session_id = session.id;
                eprintln!("Session: {}", session_id);
            }
            message => {
                // A failed turn is reported and the loop goes on; the user
                // message is already in the history.
                if let Err(e) = turn(&orchestrator, options, &session_id, message).await {
                    eprintln!("Error: {:#}", e);
                }
                println!();
            }
        }
    }

    pipeline.close().await;
    Ok(())
}
