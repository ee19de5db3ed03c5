//! Durable, append-only chat history.
//!
//! One ordered record list per `(user_id, session_id)` key. Appends are
//! atomic: a turn is either fully persisted or absent, so an aborted
//! orchestrator turn leaves a clean, replayable prefix. The in-memory
//! implementation backs tests; [`sqlite::SqliteHistoryStore`] is the
//! durable one.

#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::turn::{ConversationKey, ConversationTurn};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteHistoryStore;

/// History persistence errors. Infrastructure-fatal for the current turn.
#[derive(Debug, Error, Diagnostic)]
pub enum HistoryError {
    #[error("history backend error: {0}")]
    #[diagnostic(
        code(finbot::history::backend),
        help("Check the database URL and that migrations have been applied.")
    )]
    Backend(String),

    #[error("failed to serialize turn for persistence: {0}")]
    #[diagnostic(code(finbot::history::serde))]
    Serde(#[from] serde_json::Error),
}

/// Keyed durable store with atomic append semantics.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends one turn to the conversation's log.
    async fn append(&self, key: &ConversationKey, turn: ConversationTurn)
    -> Result<(), HistoryError>;

    /// Loads the full ordered log for a conversation; empty when none exists.
    async fn load(&self, key: &ConversationKey) -> Result<Vec<ConversationTurn>, HistoryError>;
}

/// Volatile history store for tests and development.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    conversations: Mutex<HashMap<ConversationKey, Vec<ConversationTurn>>>,
}

impl InMemoryHistoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(
        &self,
        key: &ConversationKey,
        turn: ConversationTurn,
    ) -> Result<(), HistoryError> {
        let mut guard = self.conversations.lock().await;
        guard.entry(key.clone()).or_default().push(turn);
        Ok(())
    }

    async fn load(&self, key: &ConversationKey) -> Result<Vec<ConversationTurn>, HistoryError> {
        let guard = self.conversations.lock().await;
        Ok(guard.get(key).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_round_trip_preserves_order() {
        let store = InMemoryHistoryStore::new();
        let key = ConversationKey::new("u1", "s1");

        store.append(&key, ConversationTurn::user("one")).await.unwrap();
        store
            .append(&key, ConversationTurn::assistant("two"))
            .await
            .unwrap();

        let log = store.load(&key).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].content.as_deref(), Some("one"));
        assert_eq!(log[1].content.as_deref(), Some("two"));

        // Reloading must not duplicate.
        assert_eq!(store.load(&key).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn conversations_are_isolated_by_key() {
        let store = InMemoryHistoryStore::new();
        store
            .append(&ConversationKey::new("u1", "s1"), ConversationTurn::user("a"))
            .await
            .unwrap();

        let other = store
            .load(&ConversationKey::new("u1", "s2"))
            .await
            .unwrap();
        assert!(other.is_empty());
    }
}
