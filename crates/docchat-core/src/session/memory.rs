//! In-memory [`SessionStore`] for tests and single-process embedding.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{RagError, Result};

use super::{Message, Session, SessionSettings, SessionStore, SessionSummary};

/// Sessions kept in creation order behind a `RwLock`.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<Vec<Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> RagError {
    RagError::storage("in-memory session store lock poisoned")
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, settings: SessionSettings) -> Result<Session> {
        let session = Session::new(settings);
        self.sessions
            .write()
            .map_err(|_| poisoned())?
            .push(session.clone());
        tracing::info!(session_id = %session.id, "created session");
        Ok(session)
    }

    async fn append(&self, session_id: &str, message: Message) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        let session = sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| RagError::SessionNotFound(session_id.to_string()))?;
        session.messages.push(message);
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Session> {
        let sessions = self.sessions.read().map_err(|_| poisoned())?;
        sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
            .ok_or_else(|| RagError::SessionNotFound(session_id.to_string()))
    }

    async fn list(&self) -> Result<Vec<SessionSummary>> {
        let sessions = self.sessions.read().map_err(|_| poisoned())?;
        Ok(sessions.iter().map(Session::summary).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[tokio::test]
    async fn test_create_append_get() {
        let store = InMemorySessionStore::new();
        let session = store.create(SessionSettings::default()).await.unwrap();
        store
            .append(&session.id, Message::user("What is in the handbook?"))
            .await
            .unwrap();

        let loaded = store.get(&session.id).await.unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let store = InMemorySessionStore::new();
        let err = store.append("missing", Message::user("hi")).await.unwrap_err();
        assert!(matches!(err, RagError::SessionNotFound(ref id) if id == "missing"));
        assert!(matches!(
            store.get("missing").await,
            Err(RagError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_summaries() {
        let store = InMemorySessionStore::new();
        let a = store.create(SessionSettings::default()).await.unwrap();
        let b = store.create(SessionSettings::default()).await.unwrap();
        store.append(&b.id, Message::user("latest question")).await.unwrap();

        let list = store.list().await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, a.id);
        assert_eq!(list[0].last_message_preview, None);
        assert_eq!(list[1].message_count, 1);
        assert_eq!(list[1].last_message_preview.as_deref(), Some("latest question"));
    }
}
