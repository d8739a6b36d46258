//! Session record storage keyed by session id with a subject secondary index.

use super::UserSession;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tokio::sync::RwLock;

/// Prefix carried by persisted session keys; stripped before ids are reused.
pub const SESSION_KEY_PREFIX: &str = "sess:";

#[must_use]
pub fn session_key(session_id: &str) -> String {
    format!("{SESSION_KEY_PREFIX}{session_id}")
}

#[must_use]
pub fn strip_session_prefix(key: &str) -> &str {
    key.strip_prefix(SESSION_KEY_PREFIX).unwrap_or(key)
}

/// Store-side projection of a [`UserSession`] plus its owning subject.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub subject_id: String,
    pub session: UserSession,
}

impl SessionRecord {
    #[must_use]
    pub fn new(id: impl Into<String>, session: UserSession) -> Self {
        Self {
            id: id.into(),
            subject_id: session.subject_id.clone(),
            session,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid session record: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Distributed session store consumed by the teardown coordinator and the
/// session middleware.
#[async_trait]
pub trait SessionRecordStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError>;

    async fn put(&self, record: SessionRecord) -> Result<(), StoreError>;

    /// Overwrite a record that is still stored; never creates one.
    ///
    /// Returns `false` when the id is no longer present, e.g. because a logout
    /// removed it while the request that loaded it was still running.
    async fn update(&self, record: SessionRecord) -> Result<bool, StoreError>;

    /// Deleting an id that is not stored is not an error.
    async fn delete_by_id(&self, session_id: &str) -> Result<(), StoreError>;

    /// Every session id (without key prefix) owned by `subject_id`.
    async fn list_ids_by_subject(&self, subject_id: &str) -> Result<Vec<String>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn kind(&self) -> &'static str;
}

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<String, SessionRecord>,
    by_subject: HashMap<String, BTreeSet<String>>,
}

impl MemoryState {
    fn insert(&mut self, key: String, record: SessionRecord) {
        let previous_subject = self
            .records
            .get(&key)
            .map(|previous| previous.subject_id.clone());
        if let Some(previous_subject) = previous_subject {
            self.unindex(&previous_subject, &key);
        }
        self.by_subject
            .entry(record.subject_id.clone())
            .or_default()
            .insert(key.clone());
        self.records.insert(key, record);
    }

    fn unindex(&mut self, subject_id: &str, key: &str) {
        if let Some(keys) = self.by_subject.get_mut(subject_id) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_subject.remove(subject_id);
            }
        }
    }
}

/// In-process store for single-instance deployments and tests.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    state: RwLock<MemoryState>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionRecordStore for MemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state.records.get(&session_key(session_id)).cloned())
    }

    async fn put(&self, record: SessionRecord) -> Result<(), StoreError> {
        let key = session_key(&record.id);
        self.state.write().await.insert(key, record);
        Ok(())
    }

    async fn update(&self, record: SessionRecord) -> Result<bool, StoreError> {
        let key = session_key(&record.id);
        let mut state = self.state.write().await;
        if !state.records.contains_key(&key) {
            return Ok(false);
        }
        state.insert(key, record);
        Ok(true)
    }

    async fn delete_by_id(&self, session_id: &str) -> Result<(), StoreError> {
        let key = session_key(session_id);
        let mut state = self.state.write().await;
        if let Some(record) = state.records.remove(&key) {
            state.unindex(&record.subject_id, &key);
        }
        Ok(())
    }

    async fn list_ids_by_subject(&self, subject_id: &str) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .by_subject
            .get(subject_id)
            .map(|keys| {
                keys.iter()
                    .map(|key| strip_session_prefix(key).to_string())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TokenSet;

    fn record(id: &str, subject: &str) -> SessionRecord {
        SessionRecord::new(
            id,
            UserSession::authenticated(subject, TokenSet::new("a", "r", "i")),
        )
    }

    #[test]
    fn strip_session_prefix_only_removes_leading_prefix() {
        assert_eq!(strip_session_prefix("sess:abc"), "abc");
        assert_eq!(strip_session_prefix("abc"), "abc");
        assert_eq!(strip_session_prefix("abc:sess:"), "abc:sess:");
        assert_eq!(session_key("abc"), "sess:abc");
    }

    #[tokio::test]
    async fn put_get_delete() -> Result<(), StoreError> {
        let store = MemorySessionStore::new();
        store.put(record("s1", "u1")).await?;

        let loaded = store.get("s1").await?;
        assert_eq!(loaded.map(|r| r.subject_id), Some("u1".to_string()));

        store.delete_by_id("s1").await?;
        assert!(store.get("s1").await?.is_none());
        assert!(store.list_ids_by_subject("u1").await?.is_empty());

        // deleting twice is fine
        store.delete_by_id("s1").await?;
        Ok(())
    }

    #[tokio::test]
    async fn list_ids_by_subject_returns_only_that_subject() -> Result<(), StoreError> {
        let store = MemorySessionStore::new();
        store.put(record("s1", "u1")).await?;
        store.put(record("s2", "u1")).await?;
        store.put(record("s3", "u2")).await?;

        let mut ids = store.list_ids_by_subject("u1").await?;
        ids.sort();
        assert_eq!(ids, vec!["s1".to_string(), "s2".to_string()]);
        assert_eq!(store.list_ids_by_subject("u2").await?, vec!["s3".to_string()]);
        assert!(store.list_ids_by_subject("nobody").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn update_never_recreates_a_deleted_record() -> Result<(), StoreError> {
        let store = MemorySessionStore::new();
        assert!(!store.update(record("s1", "u1")).await?);
        assert!(store.is_empty().await);

        store.put(record("s1", "u1")).await?;
        let mut changed = record("s1", "u1");
        changed.session.is_authenticated = false;
        assert!(store.update(changed).await?);
        assert!(
            store
                .get("s1")
                .await?
                .is_some_and(|stored| !stored.session.is_authenticated)
        );

        store.delete_by_id("s1").await?;
        assert!(!store.update(record("s1", "u1")).await?);
        assert!(store.get("s1").await?.is_none());
        assert!(store.list_ids_by_subject("u1").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn put_moves_index_when_subject_changes() -> Result<(), StoreError> {
        let store = MemorySessionStore::new();
        store.put(record("s1", "u1")).await?;
        store.put(record("s1", "u2")).await?;

        assert!(store.list_ids_by_subject("u1").await?.is_empty());
        assert_eq!(store.list_ids_by_subject("u2").await?, vec!["s1".to_string()]);
        assert_eq!(store.len().await, 1);
        Ok(())
    }
}
