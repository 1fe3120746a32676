//! In-memory implementation of every repository trait.
//!
//! Each record type lives behind its own `tokio::sync::Mutex`; a
//! read-modify-write holds the lock for its whole duration, which makes it
//! atomic per store.

use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{
    IndexRegistry, SessionStore, SessionTouch, StatusStore, TranscriptStore, FOREIGN_SESSION,
};
use crate::models::{ChatSession, ProcessingStatus, Role, TranscriptItem, UserIndexRecord};

#[derive(Default)]
pub struct InMemoryStore {
    registry: Mutex<HashMap<String, Vec<String>>>,
    statuses: Mutex<HashMap<(String, String), ProcessingStatus>>,
    sessions: Mutex<HashMap<String, ChatSession>>,
    transcripts: Mutex<HashMap<String, Vec<TranscriptItem>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IndexRegistry for InMemoryStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserIndexRecord>> {
        let registry = self.registry.lock().await;
        Ok(registry.get(user_id).map(|ids| UserIndexRecord {
            user_id: user_id.to_string(),
            vector_store_ids: ids.clone(),
        }))
    }

    async fn upsert(&self, user_id: &str, vector_store_id: &str) -> Result<UserIndexRecord> {
        let mut registry = self.registry.lock().await;
        let ids = registry.entry(user_id.to_string()).or_default();
        if !ids.iter().any(|id| id == vector_store_id) {
            ids.push(vector_store_id.to_string());
        }
        Ok(UserIndexRecord {
            user_id: user_id.to_string(),
            vector_store_ids: ids.clone(),
        })
    }
}

#[async_trait]
impl StatusStore for InMemoryStore {
    async fn put_status(&self, status: &ProcessingStatus) -> Result<()> {
        self.statuses.lock().await.insert(
            (status.user_id.clone(), status.file_name.clone()),
            status.clone(),
        );
        Ok(())
    }

    async fn get_status(&self, user_id: &str, file_name: &str) -> Result<Option<ProcessingStatus>> {
        let statuses = self.statuses.lock().await;
        Ok(statuses
            .get(&(user_id.to_string(), file_name.to_string()))
            .cloned())
    }

    async fn list_statuses(&self, user_id: &str) -> Result<Vec<ProcessingStatus>> {
        let statuses = self.statuses.lock().await;
        let mut out: Vec<ProcessingStatus> = statuses
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        Ok(out)
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn touch_session(&self, session_id: &str, user_id: &str) -> Result<SessionTouch> {
        let mut sessions = self.sessions.lock().await;
        let now = Utc::now();
        match sessions.get_mut(session_id) {
            Some(session) if session.user_id != user_id => bail!(FOREIGN_SESSION),
            Some(session) => {
                session.updated_at = now;
                Ok(SessionTouch::Touched)
            }
            None => {
                sessions.insert(
                    session_id.to_string(),
                    ChatSession {
                        session_id: session_id.to_string(),
                        user_id: user_id.to_string(),
                        created_at: now,
                        updated_at: now,
                    },
                );
                Ok(SessionTouch::Created)
            }
        }
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<ChatSession>> {
        Ok(self.sessions.lock().await.get(session_id).cloned())
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>> {
        let sessions = self.sessions.lock().await;
        let mut out: Vec<ChatSession> = sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(out)
    }

    async fn delete_session(&self, session_id: &str, user_id: &str) -> Result<bool> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(session_id) {
            None => Ok(false),
            Some(session) if session.user_id != user_id => bail!(FOREIGN_SESSION),
            Some(_) => {
                sessions.remove(session_id);
                self.transcripts.lock().await.remove(session_id);
                Ok(true)
            }
        }
    }
}

#[async_trait]
impl TranscriptStore for InMemoryStore {
    async fn append_turn(
        &self,
        session_id: &str,
        user: &TranscriptItem,
        assistant: &TranscriptItem,
    ) -> Result<()> {
        let mut transcripts = self.transcripts.lock().await;
        let items = transcripts.entry(session_id.to_string()).or_default();
        items.push(user.clone());
        items.push(assistant.clone());
        Ok(())
    }

    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<TranscriptItem>> {
        let transcripts = self.transcripts.lock().await;
        let items = transcripts.get(session_id).map(Vec::as_slice).unwrap_or(&[]);
        let skip = items.len().saturating_sub(limit);
        Ok(items[skip..].to_vec())
    }

    async fn reply_for(&self, session_id: &str, client_message_id: &str) -> Result<Option<String>> {
        let transcripts = self.transcripts.lock().await;
        let Some(items) = transcripts.get(session_id) else {
            return Ok(None);
        };
        let Some(pos) = items
            .iter()
            .rposition(|i| i.client_message_id.as_deref() == Some(client_message_id))
        else {
            return Ok(None);
        };
        Ok(items
            .get(pos + 1)
            .filter(|next| next.role == Role::Assistant)
            .map(|next| next.content.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_upsert_is_idempotent() {
        let store = InMemoryStore::new();
        assert!(store.get("u1").await.unwrap().is_none());

        store.upsert("u1", "vs-1").await.unwrap();
        store.upsert("u1", "vs-1").await.unwrap();
        let record = store.upsert("u1", "vs-2").await.unwrap();
        assert_eq!(record.vector_store_ids, vec!["vs-1", "vs-2"]);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_keep_single_copy() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.upsert("u1", "vs-1").await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        let record = store.get("u1").await.unwrap().unwrap();
        assert_eq!(record.vector_store_ids, vec!["vs-1"]);
    }

    #[tokio::test]
    async fn test_session_ownership() {
        let store = InMemoryStore::new();
        assert_eq!(
            store.touch_session("s1", "u1").await.unwrap(),
            SessionTouch::Created
        );
        assert_eq!(
            store.touch_session("s1", "u1").await.unwrap(),
            SessionTouch::Touched
        );
        assert!(store.touch_session("s1", "u2").await.is_err());
        assert!(store.delete_session("s1", "u2").await.is_err());
        assert!(store.delete_session("s1", "u1").await.unwrap());
        assert!(!store.delete_session("s1", "u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_reply_for_finds_answer_to_client_message() {
        let store = InMemoryStore::new();
        store
            .append_turn(
                "s1",
                &TranscriptItem::user("hi", Some("m1".to_string())),
                &TranscriptItem::assistant("hello"),
            )
            .await
            .unwrap();
        store
            .append_turn(
                "s1",
                &TranscriptItem::user("again", Some("m2".to_string())),
                &TranscriptItem::assistant("still here"),
            )
            .await
            .unwrap();

        assert_eq!(store.reply_for("s1", "m1").await.unwrap().as_deref(), Some("hello"));
        assert_eq!(
            store.reply_for("s1", "m2").await.unwrap().as_deref(),
            Some("still here")
        );
        assert!(store.reply_for("s1", "m3").await.unwrap().is_none());

        let recent = store.recent("s1", 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "hello");
    }
}
