//! Session management: each conversation keeps its own message history

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::types::Message;

/// Storage for per-session conversation history.
///
/// Implementations must make `append` atomic with respect to `get` and
/// `clear` on the same session, and must hand out copies so callers never
/// observe later mutation.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Snapshot of the history for `session_id`, empty if unknown
    async fn get(&self, session_id: &str) -> Vec<Message>;

    /// Extend the history of `session_id` in order, creating it if absent
    async fn append(&self, session_id: &str, messages: Vec<Message>);

    /// Drop `session_id` and its history; no-op if absent
    async fn clear(&self, session_id: &str);
}

/// Process-wide in-memory store. Everything is lost on restart.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live sessions
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Vec<Message> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).cloned().unwrap_or_default()
    }

    async fn append(&self, session_id: &str, messages: Vec<Message>) {
        let mut sessions = self.sessions.write().await;
        let history = sessions.entry(session_id.to_string()).or_insert_with(|| {
            info!("Created session {}", session_id);
            Vec::new()
        });
        history.extend(messages);
        debug!(
            "Session '{}' appended (messages: {})",
            session_id,
            history.len()
        );
    }

    async fn clear(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(session_id).is_some() {
            info!("Cleared session {}", session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_unknown_session_is_empty() {
        let store = InMemorySessionStore::new();
        assert!(store.get("nope").await.is_empty());
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let store = InMemorySessionStore::new();
        store
            .append("s1", vec![Message::user("a"), Message::assistant("b")])
            .await;
        store.append("s1", vec![Message::user("c")]).await;

        let history = store.get("s1").await;
        assert_eq!(
            history,
            vec![
                Message::user("a"),
                Message::assistant("b"),
                Message::user("c"),
            ]
        );
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_clear_removes_history() {
        let store = InMemorySessionStore::new();
        store.append("s1", vec![Message::user("hello")]).await;
        store.clear("s1").await;
        assert!(store.get("s1").await.is_empty());

        // Clearing an unknown session is a no-op
        store.clear("never-seen").await;
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = InMemorySessionStore::new();
        store.append("a", vec![Message::user("for a")]).await;
        store.append("b", vec![Message::user("for b")]).await;
        assert_eq!(store.get("a").await, vec![Message::user("for a")]);
        assert_eq!(store.get("b").await, vec![Message::user("for b")]);
    }

    #[tokio::test]
    async fn test_snapshot_unaffected_by_later_append() {
        let store = InMemorySessionStore::new();
        store.append("s1", vec![Message::user("first")]).await;
        let snapshot = store.get("s1").await;
        store.append("s1", vec![Message::user("second")]).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.get("s1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_appends_lose_nothing() {
        let store = InMemorySessionStore::new();
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append(
                        "shared",
                        vec![Message::user(format!("q{}", i)), Message::assistant(format!("a{}", i))],
                    )
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let history = store.get("shared").await;
        assert_eq!(history.len(), 64);
        // Each append lands as a contiguous pair
        for pair in history.chunks(2) {
            let q = pair[0].content.trim_start_matches('q');
            let a = pair[1].content.trim_start_matches('a');
            assert_eq!(q, a);
        }
    }
}
