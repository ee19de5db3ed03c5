//! SQLite-backed chat history.
//!
//! Turns map to rows in `chat_turns`; the per-conversation sequence number
//! is assigned inside the insert transaction, so concurrent appends to
//! distinct keys never interleave a conversation's ordering.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use super::{HistoryError, HistoryStore};
use crate::turn::{ConversationKey, ConversationTurn, ToolCallRequest};

/// Durable history store on SQLite.
#[derive(Clone)]
pub struct SqliteHistoryStore {
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteHistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteHistoryStore").finish()
    }
}

impl SqliteHistoryStore {
    /// Connects (or creates) the database at `database_url` and applies
    /// embedded migrations.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self, HistoryError> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| HistoryError::Backend(format!("connect error: {e}")))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| HistoryError::Backend(format!("migration failure: {e}")))?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Wraps an existing pool (shared with the document store in the binary).
    #[must_use]
    pub fn with_pool(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    #[instrument(skip(self, turn), fields(key = %key, role = %turn.role), err)]
    async fn append(
        &self,
        key: &ConversationKey,
        turn: ConversationTurn,
    ) -> Result<(), HistoryError> {
        let tool_calls_json = turn
            .tool_calls
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| HistoryError::Backend(format!("tx begin: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO chat_turns (user_id, session_id, seq, role, content, tool_call_id, tool_calls, created_at)
            VALUES (
                ?1, ?2,
                (SELECT COALESCE(MAX(seq), 0) + 1 FROM chat_turns WHERE user_id = ?1 AND session_id = ?2),
                ?3, ?4, ?5, ?6, ?7
            )
            "#,
        )
        .bind(&key.user_id)
        .bind(&key.session_id)
        .bind(&turn.role)
        .bind(&turn.content)
        .bind(&turn.tool_call_id)
        .bind(&tool_calls_json)
        .bind(turn.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| HistoryError::Backend(format!("append turn: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| HistoryError::Backend(format!("tx commit: {e}")))?;
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key), err)]
    async fn load(&self, key: &ConversationKey) -> Result<Vec<ConversationTurn>, HistoryError> {
        let rows = sqlx::query(
            "SELECT role, content, tool_call_id, tool_calls, created_at \
             FROM chat_turns WHERE user_id = ?1 AND session_id = ?2 ORDER BY seq ASC",
        )
        .bind(&key.user_id)
        .bind(&key.session_id)
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(|e| HistoryError::Backend(format!("load history: {e}")))?;

        let mut turns = Vec::with_capacity(rows.len());
        for row in rows {
            let tool_calls: Option<Vec<ToolCallRequest>> = row
                .get::<Option<String>, _>("tool_calls")
                .map(|raw| serde_json::from_str(&raw))
                .transpose()?;
            let created_at = DateTime::parse_from_rfc3339(&row.get::<String, _>("created_at"))
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());

            turns.push(ConversationTurn {
                role: row.get("role"),
                content: row.get("content"),
                tool_call_id: row.get("tool_call_id"),
                tool_calls,
                created_at,
            });
        }
        Ok(turns)
    }
}
