//! # DocChat CLI (`dchat`)
//!
//! ## Usage
//!
//! ```bash
//! dchat --config ./config/dchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dchat init` | Create the SQLite database and run schema migrations |
//! | `dchat ingest <paths>...` | Chunk, embed and index files or directories |
//! | `dchat documents list` | List indexed documents |
//! | `dchat documents show <source>` | Print a document rebuilt from its chunks |
//! | `dchat delete <source>` | Remove a document from the index |
//! | `dchat search "<query>"` | Semantic search without chatting |
//! | `dchat stats` | Collection statistics |
//! | `dchat health` | Check the database, index and embedder |
//! | `dchat session <action>` | Create, list, inspect and clear sessions |
//! | `dchat chat` | Ask questions about the collection |
//! | `dchat export <session>` | Export a conversation as json, txt or md |

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use docchat::chat_cmd::{self, ChatOptions};
use docchat::export::{self, ExportFormat};
use docchat::{config, db, documents, health, ingest, logging, search, sessions, stats};

/// DocChat: chat with your documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/dchat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dchat",
    about = "DocChat: ask questions about a private document collection, with sources",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest files or directories into the collection.
    ///
    /// Re-ingesting a source replaces its previous chunks.
    Ingest {
        /// Files or directories.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Glob patterns selecting files inside directories (repeatable).
        #[arg(long)]
        include: Vec<String>,

        /// Glob patterns to skip inside directories (repeatable).
        #[arg(long)]
        exclude: Vec<String>,

        /// Override the file type label derived from the extension.
        #[arg(long)]
        file_type: Option<String>,
    },

    /// Inspect and manage indexed documents.
    Documents {
        #[command(subcommand)]
        action: DocumentsAction,
    },

    /// Remove a document (all of its chunks) from the index.
    Delete {
        /// Source name as shown by `documents list`.
        source: String,
    },

    /// Semantic search over the collection.
    Search {
        query: String,

        /// Maximum number of results. Defaults to `[retrieval] top_k`.
        #[arg(long)]
        limit: Option<usize>,

        /// Only search chunks of this source.
        #[arg(long)]
        source: Option<String>,

        /// Only search chunks of this file type.
        #[arg(long)]
        file_type: Option<String>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show collection statistics.
    Stats,

    /// Check that the database, index and embedding provider respond.
    Health,

    /// Manage chat sessions.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Chat with the collection.
    ///
    /// Without `--message`, reads questions from stdin until EOF or `/quit`.
    Chat {
        /// Continue an existing session.
        #[arg(long)]
        session: Option<String>,

        /// Ask a single question and exit.
        #[arg(long, short)]
        message: Option<String>,

        /// Answer without retrieving documents.
        #[arg(long)]
        no_rag: bool,

        /// Only retrieve from this source.
        #[arg(long)]
        source: Option<String>,

        /// Only retrieve chunks of this file type.
        #[arg(long)]
        file_type: Option<String>,

        /// Retrieve with this query instead of the message.
        #[arg(long)]
        rag_query: Option<String>,
    },

    /// Export a conversation.
    Export {
        session: String,

        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormat,

        /// Write to this file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum DocumentsAction {
    /// List documents with chunk counts.
    List,
    /// Print a document rebuilt from its chunks.
    Show { source: String },
    /// Remove every document from the index.
    Clear {
        /// Confirm.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Create a session and print its id.
    New,
    /// List sessions.
    List,
    /// Print a session's messages.
    History {
        session: String,
        /// Only the last N messages.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Message and token counts for a session.
    Stats { session: String },
    /// Start a fresh session with the same settings and print its id.
    Clear { session: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.log.level);

    match cli.command {
        Commands::Init => {
            let pool = db::open(&cfg).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            paths,
            include,
            exclude,
            file_type,
        } => {
            ingest::run_ingest(&cfg, &paths, &include, &exclude, file_type.as_deref()).await?;
        }
        Commands::Documents { action } => match action {
            DocumentsAction::List => documents::run_list(&cfg).await?,
            DocumentsAction::Show { source } => documents::run_show(&cfg, &source).await?,
            DocumentsAction::Clear { yes } => documents::run_clear(&cfg, yes).await?,
        },
        Commands::Delete { source } => {
            documents::run_delete(&cfg, &source).await?;
        }
        Commands::Search {
            query,
            limit,
            source,
            file_type,
            json,
        } => {
            search::run_search(
                &cfg,
                &query,
                limit,
                source.as_deref(),
                file_type.as_deref(),
                json,
            )
            .await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Health => {
            health::run_health(&cfg).await?;
        }
        Commands::Session { action } => match action {
            SessionAction::New => sessions::run_new(&cfg).await?,
            SessionAction::List => sessions::run_list(&cfg).await?,
            SessionAction::History { session, limit } => {
                sessions::run_history(&cfg, &session, limit).await?
            }
            SessionAction::Stats { session } => sessions::run_stats(&cfg, &session).await?,
            SessionAction::Clear { session } => sessions::run_clear(&cfg, &session).await?,
        },
        Commands::Chat {
            session,
            message,
            no_rag,
            source,
            file_type,
            rag_query,
        } => {
            let options = ChatOptions {
                session,
                message,
                no_rag,
                source,
                file_type,
                rag_query,
            };
            chat_cmd::run_chat(&cfg, &options).await?;
        }
        Commands::Export {
            session,
            format,
            output,
        } => {
            export::run_export(&cfg, &session, format, output.as_deref()).await?;
        }
    }

    Ok(())
}
