//! # ssokit-store-memory
//!
//! In-memory [`SessionStore`] backend.
//!
//! Suitable for tests and for embedding the session subsystem without an
//! external database. Sessions live in a map guarded by an async RwLock;
//! all operations are safe for concurrent access.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use ssokit_sessions::{Session, SessionResult, SessionStore};

/// In-memory session storage.
///
/// Cheap to clone; clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store wrapped in an Arc for sharing.
    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of stored sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if no sessions are stored.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Removes all stored sessions.
    pub async fn clear(&self) {
        self.sessions.write().await.clear();
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> SessionResult<Option<Session>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn put(&self, session: &Session) -> SessionResult<()> {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> SessionResult<bool> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn list_by_user(&self, user_id: &str) -> SessionResult<Vec<Session>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|session| session.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn count(&self) -> SessionResult<u64> {
        Ok(self.sessions.read().await.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssokit_sessions::DirectoryType;
    use time::OffsetDateTime;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemorySessionStore::new();
        let session = create_test_session("s1", "alice");

        store.put(&session).await.unwrap();
        let loaded = store.get("s1").await.unwrap().unwrap();
        assert_eq!(loaded.session_id, "s1");
        assert_eq!(loaded.user_id, "alice");

        assert!(store.delete("s1").await.unwrap());
        assert!(store.get("s1").await.unwrap().is_none());
        // Deleting again reports no record
        assert!(!store.delete("s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_replaces() {
        let store = InMemorySessionStore::new();
        let mut session = create_test_session("s1", "alice");

        store.put(&session).await.unwrap();
        session.access_token = "rotated".to_string();
        store.put(&session).await.unwrap();

        let loaded = store.get("s1").await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "rotated");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_by_user() {
        let store = InMemorySessionStore::new();
        store.put(&create_test_session("s1", "alice")).await.unwrap();
        store.put(&create_test_session("s2", "alice")).await.unwrap();
        store.put(&create_test_session("s3", "bob")).await.unwrap();

        let alice = store.list_by_user("alice").await.unwrap();
        assert_eq!(alice.len(), 2);

        let nobody = store.list_by_user("nobody").await.unwrap();
        assert!(nobody.is_empty());

        assert_eq!(store.count().await.unwrap(), 3);
    }

    fn create_test_session(id: &str, user: &str) -> Session {
        let now = OffsetDateTime::now_utc();
        Session {
            session_id: id.to_string(),
            user_id: user.to_string(),
            directory_type: DirectoryType::Local,
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            access_token_expires_at: now + time::Duration::hours(1),
            binding: None,
            created_at: now,
            last_activity_at: now,
            last_refreshed_at: None,
            revoked: false,
        }
    }
}
