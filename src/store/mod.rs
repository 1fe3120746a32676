//! Repositories for the state this backend owns.
//!
//! | Trait | Record | Key |
//! |-------|--------|-----|
//! | [`IndexRegistry`] | [`UserIndexRecord`] | user id |
//! | [`StatusStore`] | [`ProcessingStatus`] | (user id, file name) |
//! | [`SessionStore`] | [`ChatSession`] | session id |
//! | [`TranscriptStore`] | [`TranscriptItem`] | session id, in order |
//!
//! Every read-modify-write is a single atomic operation on its key, so
//! concurrent pipeline runs for one user (or chat turns for one session)
//! cannot lose updates. Implementations:
//!
//! - [`SqliteStore`](sqlite::SqliteStore): durable, one table per record type.
//! - [`InMemoryStore`](memory::InMemoryStore): process-local, for tests and
//!   one-shot CLI runs.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChatSession, ProcessingStatus, TranscriptItem, UserIndexRecord};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait IndexRegistry: Send + Sync {
    /// The user's record; `None` when the user has never ingested a file.
    async fn get(&self, user_id: &str) -> Result<Option<UserIndexRecord>>;

    /// Create the record with `vector_store_id`, or append the id when it is
    /// not already present. Returns the record after the write.
    async fn upsert(&self, user_id: &str, vector_store_id: &str) -> Result<UserIndexRecord>;
}

#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Insert or replace the status for `(user_id, file_name)`.
    async fn put_status(&self, status: &ProcessingStatus) -> Result<()>;

    async fn get_status(&self, user_id: &str, file_name: &str) -> Result<Option<ProcessingStatus>>;

    /// All statuses for a user, most recently updated first.
    async fn list_statuses(&self, user_id: &str) -> Result<Vec<ProcessingStatus>>;
}

/// Outcome of [`SessionStore::touch_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTouch {
    Created,
    Touched,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create the session for `user_id` when unseen, otherwise bump
    /// `updated_at`. Fails when the session belongs to another user.
    async fn touch_session(&self, session_id: &str, user_id: &str) -> Result<SessionTouch>;

    async fn get_session(&self, session_id: &str) -> Result<Option<ChatSession>>;

    /// Sessions owned by `user_id`, most recently updated first.
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>>;

    /// Delete a session and its transcript. Returns `false` when no such
    /// session exists; fails when it belongs to another user.
    async fn delete_session(&self, session_id: &str, user_id: &str) -> Result<bool>;
}

#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Append one completed turn: the user prompt followed by the reply.
    async fn append_turn(
        &self,
        session_id: &str,
        user: &TranscriptItem,
        assistant: &TranscriptItem,
    ) -> Result<()>;

    /// The last `limit` items of the transcript, oldest first.
    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<TranscriptItem>>;

    /// The stored reply to the user item carrying `client_message_id`.
    async fn reply_for(&self, session_id: &str, client_message_id: &str) -> Result<Option<String>>;
}

pub(crate) const FOREIGN_SESSION: &str = "session belongs to another user";
