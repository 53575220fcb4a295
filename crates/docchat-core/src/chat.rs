//! Conversation orchestration.
//!
//! [`Orchestrator::chat`] handles one user message end to end:
//!
//! ```text
//! Received ─▶ Retrieving ─┬─▶ Assembling ─▶ Completing ─▶ Appending ─▶ Done
//!          └▶ SkipRetrieval┘
//!                      (any phase) ─▶ Error
//! ```
//!
//! The user message is appended before anything else can fail, so a failed
//! turn can be retried without resubmitting it. A failed turn never records
//! an assistant message.
//!
//! Messages on one session are serialized by a per-session async mutex;
//! different sessions proceed concurrently. Progress is published as
//! [`ChatEvent`]s on a broadcast channel for transports to forward.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::completion::{Completion, CompletionOptions, CompletionProvider};
use crate::context::{ContextAssembler, Prompt};
use crate::error::{RagError, Result};
use crate::filter::MetadataFilter;
use crate::models::TokenUsage;
use crate::retrieve::Retriever;
use crate::session::{Message, MessageMetadata, Session, SessionSettings, SessionStore};

/// Buffered events per subscriber before the slowest one starts lagging.
const EVENT_CAPACITY: usize = 256;

/// Assistant reply recorded under [`EmptyRetrievalPolicy::Decline`].
pub const DECLINE_REPLY: &str =
    "I couldn't find anything in the document collection that answers this.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatPhase {
    Received,
    Retrieving,
    SkipRetrieval,
    Assembling,
    Completing,
    Appending,
    Done,
    Error,
}

impl fmt::Display for ChatPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Retrieving => "retrieving",
            Self::SkipRetrieval => "skip_retrieval",
            Self::Assembling => "assembling",
            Self::Completing => "completing",
            Self::Appending => "appending",
            Self::Done => "done",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// What to do when retrieval runs and finds nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyRetrievalPolicy {
    /// Call the completion provider without document context.
    #[default]
    Proceed,
    /// Record [`DECLINE_REPLY`] without calling the provider.
    Decline,
}

/// Events emitted per message, in this order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChatEvent {
    UserMessageRecorded {
        session_id: String,
        message_id: String,
    },
    AssistantMessageRecorded {
        session_id: String,
        message_id: String,
        retrieved_chunks: usize,
        sources: Vec<String>,
    },
    Failed {
        session_id: String,
        phase: ChatPhase,
        kind: String,
        error: String,
    },
}

/// One incoming user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    pub use_rag: bool,
    /// Restrict retrieval to matching chunks.
    #[serde(default)]
    pub filter: Option<MetadataFilter>,
    /// Retrieve with this text instead of the user message.
    #[serde(default)]
    pub rag_query: Option<String>,
}

impl ChatRequest {
    pub fn new(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            message: message.into(),
            use_rag: true,
            filter: None,
            rag_query: None,
        }
    }

    pub fn with_rag(mut self, use_rag: bool) -> Self {
        self.use_rag = use_rag;
        self
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_rag_query(mut self, query: impl Into<String>) -> Self {
        self.rag_query = Some(query.into());
        self
    }
}

/// Assistant answer plus provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub message_id: String,
    pub text: String,
    pub retrieved_chunks: usize,
    pub sources: Vec<String>,
    pub rag_disabled: bool,
    pub usage: Option<TokenUsage>,
    pub model: Option<String>,
    /// History turns left out of the prompt for budget reasons.
    pub dropped_history: usize,
}

/// Coordinates retrieval, prompt assembly, completion and session appends.
///
/// Holds no conversation state itself; history lives in the
/// [`SessionStore`], chunks in the retriever's index.
pub struct Orchestrator {
    sessions: Arc<dyn SessionStore>,
    retriever: Retriever,
    assembler: ContextAssembler,
    completion: Arc<dyn CompletionProvider>,
    empty_policy: EmptyRetrievalPolicy,
    completion_timeout: Option<Duration>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    events: broadcast::Sender<ChatEvent>,
}

impl Orchestrator {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        retriever: Retriever,
        completion: Arc<dyn CompletionProvider>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sessions,
            retriever,
            assembler: ContextAssembler::new(),
            completion,
            empty_policy: EmptyRetrievalPolicy::default(),
            completion_timeout: None,
            locks: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn with_assembler(mut self, assembler: ContextAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn with_empty_retrieval_policy(mut self, policy: EmptyRetrievalPolicy) -> Self {
        self.empty_policy = policy;
        self
    }

    /// Time-box the completion call. A timeout is reported as
    /// [`RagError::Provider`].
    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = Some(timeout);
        self
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub async fn create_session(&self, settings: SessionSettings) -> Result<Session> {
        self.sessions.create(settings).await
    }

    /// Start over: a new, empty session with the same settings. The old
    /// session's history is left as it was.
    pub async fn clear_session(&self, session_id: &str) -> Result<Session> {
        let old = self.sessions.get(session_id).await?;
        let fresh = self.sessions.create(old.settings).await?;
        tracing::info!(from = %session_id, to = %fresh.id, "cleared conversation");
        Ok(fresh)
    }

    /// Process one user message.
    ///
    /// # Errors
    ///
    /// - [`RagError::SessionNotFound`] for an unknown session (nothing recorded).
    /// - [`RagError::EmbeddingUnavailable`] when retrieval fails.
    /// - [`RagError::Provider`] when completion fails or times out.
    /// - [`RagError::Storage`] / [`RagError::DimensionMismatch`] from the stores.
    ///
    /// In every error case after the user message was recorded, the session
    /// holds that message and no assistant reply.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatReply> {
        let lock = self.session_lock(&request.session_id)?;
        let _guard = lock.lock().await;

        let mut phase = ChatPhase::Received;
        match self.run(&request, &mut phase).await {
            Ok(reply) => {
                self.enter(&mut phase, ChatPhase::Done, &request.session_id);
                Ok(reply)
            }
            Err(err) => {
                tracing::warn!(
                    session_id = %request.session_id,
                    %phase,
                    kind = err.kind(),
                    error = %err,
                    "chat turn failed"
                );
                self.emit(ChatEvent::Failed {
                    session_id: request.session_id.clone(),
                    phase,
                    kind: err.kind().to_string(),
                    error: err.to_string(),
                });
                phase = ChatPhase::Error;
                tracing::debug!(session_id = %request.session_id, %phase, "chat phase");
                Err(err)
            }
        }
    }

    async fn run(&self, request: &ChatRequest, phase: &mut ChatPhase) -> Result<ChatReply> {
        let session_id = request.session_id.as_str();

        // Snapshot before the new message; the assembler adds it separately.
        let session = self.sessions.get(session_id).await?;
        let user = Message::user(request.message.clone());
        let user_id = user.id.clone();
        self.sessions.append(session_id, user).await?;
        self.emit(ChatEvent::UserMessageRecorded {
            session_id: session_id.to_string(),
            message_id: user_id,
        });

        let next = if request.use_rag {
            ChatPhase::Retrieving
        } else {
            ChatPhase::SkipRetrieval
        };
        self.enter(phase, next, session_id);

        let query = request.rag_query.as_deref().unwrap_or(&request.message);
        let retrieval = self
            .retriever
            .retrieve(
                query,
                session.settings.retrieval_k,
                request.filter.as_ref(),
                request.use_rag,
            )
            .await?;
        let sources = retrieval.sources();

        if request.use_rag
            && retrieval.is_empty()
            && self.empty_policy == EmptyRetrievalPolicy::Decline
        {
            self.enter(phase, ChatPhase::Appending, session_id);
            let metadata = MessageMetadata::default();
            return self
                .record_reply(session_id, DECLINE_REPLY.to_string(), metadata, 0)
                .await;
        }

        self.enter(phase, ChatPhase::Assembling, session_id);
        let prompt = self.assembler.assemble(
            &session,
            &request.message,
            &retrieval,
            session.settings.context_budget,
        );

        self.enter(phase, ChatPhase::Completing, session_id);
        let options = CompletionOptions::from(&session.settings);
        let completion = self.complete(&prompt, &options).await?;

        self.enter(phase, ChatPhase::Appending, session_id);
        let metadata = MessageMetadata {
            retrieved_chunks: retrieval.len(),
            sources,
            usage: Some(completion.usage),
            model: Some(completion.model),
            rag_disabled: !request.use_rag,
        };
        self.record_reply(session_id, completion.text, metadata, prompt.dropped_history)
            .await
    }

    async fn record_reply(
        &self,
        session_id: &str,
        text: String,
        metadata: MessageMetadata,
        dropped_history: usize,
    ) -> Result<ChatReply> {
        let message = Message::assistant(text.clone(), metadata.clone());
        let message_id = message.id.clone();
        self.sessions.append(session_id, message).await?;

        self.emit(ChatEvent::AssistantMessageRecorded {
            session_id: session_id.to_string(),
            message_id: message_id.clone(),
            retrieved_chunks: metadata.retrieved_chunks,
            sources: metadata.sources.clone(),
        });

        Ok(ChatReply {
            message_id,
            text,
            retrieved_chunks: metadata.retrieved_chunks,
            sources: metadata.sources,
            rag_disabled: metadata.rag_disabled,
            usage: metadata.usage,
            model: metadata.model,
            dropped_history,
        })
    }

    async fn complete(&self, prompt: &Prompt, options: &CompletionOptions) -> Result<Completion> {
        let fut = self.completion.complete(prompt, options);
        match self.completion_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                RagError::Provider(format!(
                    "{} timed out after {} ms",
                    self.completion.name(),
                    limit.as_millis()
                ))
            })?,
            None => fut.await,
        }
    }

    fn enter(&self, phase: &mut ChatPhase, next: ChatPhase, session_id: &str) {
        *phase = next;
        tracing::debug!(session_id, phase = %next, "chat phase");
    }

    fn emit(&self, event: ChatEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn session_lock(&self, session_id: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| RagError::storage("session lock table poisoned"))?;
        // Drop locks nobody holds or waits on.
        locks.retain(|id, lock| id == session_id || Arc::strong_count(lock) > 1);
        Ok(locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }
}
