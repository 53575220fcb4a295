//! SQLite-backed [`SessionStore`].
//!
//! One row per session in `sessions` (settings stored as JSON) and one row
//! per message in `messages`, ordered by an autoincrement `seq`. Rows are
//! only ever inserted.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use docchat_core::error::{RagError, Result};
use docchat_core::session::{
    preview, Message, MessageMetadata, Session, SessionSettings, SessionStore, SessionSummary,
};

pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn storage(e: impl std::fmt::Display) -> RagError {
    RagError::storage(e)
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RagError::storage(format!("bad timestamp '{}': {}", s, e)))
}

fn row_to_message(row: &SqliteRow) -> Result<Message> {
    let role: String = row.try_get("role").map_err(storage)?;
    let timestamp: String = row.try_get("timestamp").map_err(storage)?;
    let metadata_json: Option<String> = row.try_get("metadata_json").map_err(storage)?;
    let metadata = match metadata_json {
        Some(json) => Some(serde_json::from_str::<MessageMetadata>(&json).map_err(storage)?),
        None => None,
    };
    Ok(Message {
        id: row.try_get("id").map_err(storage)?,
        role: role.parse()?,
        content: row.try_get("content").map_err(storage)?,
        timestamp: parse_ts(&timestamp)?,
        metadata,
    })
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create(&self, settings: SessionSettings) -> Result<Session> {
        let session = Session::new(settings);
        let settings_json = serde_json::to_string(&session.settings).map_err(storage)?;
        sqlx::query("INSERT INTO sessions (id, created_at, settings_json) VALUES (?, ?, ?)")
            .bind(&session.id)
            .bind(format_ts(&session.created_at))
            .bind(settings_json)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        tracing::info!(session_id = %session.id, "created session");
        Ok(session)
    }

    async fn append(&self, session_id: &str, message: Message) -> Result<()> {
        let metadata_json = message
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(storage)?;

        let mut tx = self.pool.begin().await.map_err(storage)?;
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(storage)?;
        if !exists {
            return Err(RagError::SessionNotFound(session_id.to_string()));
        }

        sqlx::query(
            "INSERT INTO messages (id, session_id, role, content, timestamp, metadata_json) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(session_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(format_ts(&message.timestamp))
        .bind(metadata_json)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;
        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Session> {
        let row = sqlx::query("SELECT id, created_at, settings_json FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .ok_or_else(|| RagError::SessionNotFound(session_id.to_string()))?;

        let created_at: String = row.try_get("created_at").map_err(storage)?;
        let settings_json: String = row.try_get("settings_json").map_err(storage)?;

        let rows = sqlx::query(
            "SELECT id, role, content, timestamp, metadata_json FROM messages \
             WHERE session_id = ? ORDER BY seq",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        Ok(Session {
            id: row.try_get("id").map_err(storage)?,
            created_at: parse_ts(&created_at)?,
            messages: rows.iter().map(row_to_message).collect::<Result<_>>()?,
            settings: serde_json::from_str(&settings_json).map_err(storage)?,
        })
    }

    async fn list(&self) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.created_at,
                   (SELECT COUNT(*) FROM messages m WHERE m.session_id = s.id) AS message_count,
                   (SELECT content FROM messages m WHERE m.session_id = s.id
                    ORDER BY m.seq DESC LIMIT 1) AS last_content
            FROM sessions s
            ORDER BY s.created_at, s.rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter()
            .map(|row| {
                let created_at: String = row.try_get("created_at").map_err(storage)?;
                let count: i64 = row.try_get("message_count").map_err(storage)?;
                let last: Option<String> = row.try_get("last_content").map_err(storage)?;
                Ok(SessionSummary {
                    id: row.try_get("id").map_err(storage)?,
                    created_at: parse_ts(&created_at)?,
                    message_count: count as usize,
                    last_message_preview: last.as_deref().map(preview),
                })
            })
            .collect()
    }
}
