//! Conversation sessions and the [`SessionStore`] abstraction.
//!
//! A session is an append-only message log plus the settings it was created
//! with. Messages are never edited or removed; "clearing" a conversation
//! means creating a new session with the same settings.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Role, TokenUsage};

/// Length of [`SessionSummary::last_message_preview`], in characters.
pub const PREVIEW_CHARS: usize = 100;

/// Per-session settings, fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub model: String,
    pub temperature: f32,
    /// Completion output limit.
    pub max_tokens: u32,
    pub system_directive: Option<String>,
    /// Number of chunks to retrieve per message.
    pub retrieval_k: usize,
    /// Prompt budget in estimated tokens.
    pub context_budget: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            model: "claude-3-sonnet-20240229".to_string(),
            temperature: 0.7,
            max_tokens: 4000,
            system_directive: None,
            retrieval_k: 5,
            context_budget: 8000,
        }
    }
}

/// Provenance and usage recorded on assistant messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub retrieved_chunks: usize,
    /// Distinct source filenames, best match first.
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub rag_disabled: bool,
}

/// One message in a session. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, metadata: MessageMetadata) -> Self {
        let mut msg = Self::new(Role::Assistant, content);
        msg.metadata = Some(metadata);
        msg
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// A conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<Message>,
    pub settings: SessionSettings,
}

impl Session {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            messages: Vec::new(),
            settings,
        }
    }

    /// Timestamp of the newest message, or creation time when empty.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.messages
            .last()
            .map(|m| m.timestamp)
            .unwrap_or(self.created_at)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            created_at: self.created_at,
            message_count: self.messages.len(),
            last_message_preview: self.messages.last().map(|m| preview(&m.content)),
        }
    }

    /// The last `limit` messages (all when `None`).
    pub fn history(&self, limit: Option<usize>) -> &[Message] {
        match limit {
            Some(n) if n < self.messages.len() => &self.messages[self.messages.len() - n..],
            _ => &self.messages,
        }
    }

    pub fn statistics(&self) -> SessionStatistics {
        let mut stats = SessionStatistics {
            session_id: self.id.clone(),
            total_messages: self.messages.len(),
            created_at: self.created_at,
            updated_at: self.updated_at(),
            ..Default::default()
        };
        for msg in &self.messages {
            match msg.role {
                Role::User => stats.user_messages += 1,
                Role::Assistant => stats.assistant_messages += 1,
                Role::System => stats.system_messages += 1,
            }
            if let Some(usage) = msg.metadata.as_ref().and_then(|m| m.usage) {
                stats.total_tokens += usage.total();
            }
        }
        stats
    }
}

/// Listing entry for [`SessionStore::list`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
    pub last_message_preview: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStatistics {
    pub session_id: String,
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub system_messages: usize,
    pub total_tokens: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// First [`PREVIEW_CHARS`] characters, with `...` appended when cut.
pub fn preview(content: &str) -> String {
    if content.chars().count() > PREVIEW_CHARS {
        let mut s: String = content.chars().take(PREVIEW_CHARS).collect();
        s.push_str("...");
        s
    } else {
        content.to_string()
    }
}

/// Durable home of session history.
///
/// Implementations own message durability; the orchestrator and assembler
/// only read snapshots and append.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create and persist an empty session.
    async fn create(&self, settings: SessionSettings) -> Result<Session>;

    /// Append a message. Fails with
    /// [`RagError::SessionNotFound`](crate::error::RagError::SessionNotFound)
    /// for an unknown id.
    async fn append(&self, session_id: &str, message: Message) -> Result<()>;

    /// Snapshot of a session. Fails with `SessionNotFound` for an unknown id.
    async fn get(&self, session_id: &str) -> Result<Session>;

    /// Summaries of all sessions, oldest first.
    async fn list(&self) -> Result<Vec<SessionSummary>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_long_content() {
        let long = "x".repeat(150);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
        assert!(p.ends_with("..."));
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_history_limit() {
        let mut s = Session::new(SessionSettings::default());
        for i in 0..5 {
            s.messages.push(Message::user(format!("m{}", i)));
        }
        let last_two: Vec<&str> = s.history(Some(2)).iter().map(|m| m.content.as_str()).collect();
        assert_eq!(last_two, vec!["m3", "m4"]);
        assert_eq!(s.history(None).len(), 5);
        assert_eq!(s.history(Some(50)).len(), 5);
    }

    #[test]
    fn test_statistics_counts_tokens() {
        let mut s = Session::new(SessionSettings::default());
        s.messages.push(Message::user("hi"));
        s.messages.push(Message::assistant(
            "hello",
            MessageMetadata {
                usage: Some(TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                }),
                ..Default::default()
            },
        ));
        s.messages.push(Message::system("note"));
        let stats = s.statistics();
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.user_messages, 1);
        assert_eq!(stats.assistant_messages, 1);
        assert_eq!(stats.system_messages, 1);
        assert_eq!(stats.total_tokens, 15);
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: SessionSettings =
            serde_json::from_str(r#"{"temperature": 0.2, "retrieval_k": 3}"#).unwrap();
        assert_eq!(settings.retrieval_k, 3);
        assert!((settings.temperature - 0.2).abs() < 1e-6);
        assert_eq!(settings.max_tokens, 4000);
    }
}
