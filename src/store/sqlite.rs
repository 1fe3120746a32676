//! SQLite-backed repositories.
//!
//! Timestamps are stored as Unix milliseconds. The registry upsert and the
//! session touch are single statements, so SQLite's write serialization
//! makes them atomic per key without explicit locking.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{
    IndexRegistry, SessionStore, SessionTouch, StatusStore, TranscriptStore, FOREIGN_SESSION,
};
use crate::models::{
    ChatSession, ProcessingState, ProcessingStatus, Role, TranscriptItem, UserIndexRecord,
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn status_from_row(row: &SqliteRow) -> Result<ProcessingStatus> {
    let status: String = row.get("status");
    let progress: i64 = row.get("progress_percentage");
    Ok(ProcessingStatus {
        user_id: row.get("user_id"),
        file_name: row.get("file_name"),
        status: ProcessingState::parse(&status)?,
        progress_percentage: progress.clamp(0, 100) as u8,
        started_at: from_millis(row.get("started_at")),
        updated_at: from_millis(row.get("updated_at")),
        error: row.get("error"),
    })
}

fn session_from_row(row: &SqliteRow) -> ChatSession {
    ChatSession {
        session_id: row.get("session_id"),
        user_id: row.get("user_id"),
        created_at: from_millis(row.get("created_at")),
        updated_at: from_millis(row.get("updated_at")),
    }
}

#[async_trait]
impl IndexRegistry for SqliteStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserIndexRecord>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT vector_store_id FROM user_vector_stores WHERE user_id = ? ORDER BY position",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        if ids.is_empty() {
            return Ok(None);
        }
        Ok(Some(UserIndexRecord {
            user_id: user_id.to_string(),
            vector_store_ids: ids,
        }))
    }

    async fn upsert(&self, user_id: &str, vector_store_id: &str) -> Result<UserIndexRecord> {
        sqlx::query(
            r#"
            INSERT INTO user_vector_stores (user_id, position, vector_store_id, created_at)
            SELECT ?, COALESCE(MAX(position) + 1, 0), ?, ?
            FROM user_vector_stores WHERE user_id = ?
            ON CONFLICT(user_id, vector_store_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(vector_store_id)
        .bind(Utc::now().timestamp_millis())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        match self.get(user_id).await? {
            Some(record) => Ok(record),
            None => bail!("registry record for '{}' missing after upsert", user_id),
        }
    }
}

#[async_trait]
impl StatusStore for SqliteStore {
    async fn put_status(&self, status: &ProcessingStatus) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO document_processing_status
                (user_id, file_name, status, progress_percentage, started_at, updated_at, error)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, file_name) DO UPDATE SET
                status = excluded.status,
                progress_percentage = excluded.progress_percentage,
                started_at = excluded.started_at,
                updated_at = excluded.updated_at,
                error = excluded.error
            "#,
        )
        .bind(&status.user_id)
        .bind(&status.file_name)
        .bind(status.status.as_str())
        .bind(status.progress_percentage as i64)
        .bind(status.started_at.timestamp_millis())
        .bind(status.updated_at.timestamp_millis())
        .bind(&status.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_status(&self, user_id: &str, file_name: &str) -> Result<Option<ProcessingStatus>> {
        let row = sqlx::query(
            "SELECT * FROM document_processing_status WHERE user_id = ? AND file_name = ?",
        )
        .bind(user_id)
        .bind(file_name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(status_from_row).transpose()
    }

    async fn list_statuses(&self, user_id: &str) -> Result<Vec<ProcessingStatus>> {
        let rows = sqlx::query(
            "SELECT * FROM document_processing_status WHERE user_id = ? ORDER BY updated_at DESC, file_name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(status_from_row).collect()
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn touch_session(&self, session_id: &str, user_id: &str) -> Result<SessionTouch> {
        let now = Utc::now().timestamp_millis();

        let inserted = sqlx::query(
            r#"
            INSERT INTO sessions (session_id, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(session_id) DO NOTHING
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            return Ok(SessionTouch::Created);
        }

        let touched =
            sqlx::query("UPDATE sessions SET updated_at = ? WHERE session_id = ? AND user_id = ?")
                .bind(now)
                .bind(session_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        if touched.rows_affected() == 0 {
            bail!(FOREIGN_SESSION);
        }
        Ok(SessionTouch::Touched)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<ChatSession>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>> {
        let rows = sqlx::query(
            "SELECT * FROM sessions WHERE user_id = ? ORDER BY updated_at DESC, session_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(session_from_row).collect())
    }

    async fn delete_session(&self, session_id: &str, user_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let owner: Option<String> =
            sqlx::query_scalar("SELECT user_id FROM sessions WHERE session_id = ?")
                .bind(session_id)
                .fetch_optional(&mut *tx)
                .await?;

        match owner {
            None => return Ok(false),
            Some(owner) if owner != user_id => bail!(FOREIGN_SESSION),
            Some(_) => {}
        }

        sqlx::query("DELETE FROM session_items WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl TranscriptStore for SqliteStore {
    async fn append_turn(
        &self,
        session_id: &str,
        user: &TranscriptItem,
        assistant: &TranscriptItem,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for item in [user, assistant] {
            sqlx::query(
                r#"
                INSERT INTO session_items (session_id, role, content, client_message_id, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(session_id)
            .bind(item.role.as_str())
            .bind(&item.content)
            .bind(&item.client_message_id)
            .bind(item.created_at.timestamp_millis())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<TranscriptItem>> {
        let rows = sqlx::query(
            r#"
            SELECT role, content, client_message_id, created_at FROM (
                SELECT * FROM session_items WHERE session_id = ? ORDER BY seq DESC LIMIT ?
            ) ORDER BY seq ASC
            "#,
        )
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let role: String = row.get("role");
                Ok(TranscriptItem {
                    role: Role::parse(&role)?,
                    content: row.get("content"),
                    client_message_id: row.get("client_message_id"),
                    created_at: from_millis(row.get("created_at")),
                })
            })
            .collect()
    }

    async fn reply_for(&self, session_id: &str, client_message_id: &str) -> Result<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT role, content FROM session_items
            WHERE session_id = ?
              AND seq > (
                SELECT MAX(seq) FROM session_items
                WHERE session_id = ? AND client_message_id = ?
              )
            ORDER BY seq
            LIMIT 1
            "#,
        )
        .bind(session_id)
        .bind(session_id)
        .bind(client_message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|row| {
            let role: String = row.get("role");
            (role == Role::Assistant.as_str()).then(|| row.get("content"))
        }))
    }
}
