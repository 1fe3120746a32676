//! Core data models used throughout the ingestion pipeline and chat responder.
//!
//! These types represent the events, per-user records, and response envelopes
//! that flow between the orchestrator, the repositories, and the HTTP surface.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file-arrival event emitted by object storage.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadEvent {
    /// Object path, e.g. `user-documents/u1/report.pdf`.
    #[serde(alias = "name")]
    pub storage_path: String,
    #[serde(alias = "bucket")]
    pub bucket_name: String,
}

/// User and file derived from an [`UploadEvent`]'s storage path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub user_id: String,
    pub file_name: String,
}

impl UploadEvent {
    pub fn new(storage_path: impl Into<String>, bucket_name: impl Into<String>) -> Self {
        Self {
            storage_path: storage_path.into(),
            bucket_name: bucket_name.into(),
        }
    }

    /// Splits the storage path into its user-id and file-name segments.
    ///
    /// The file name is the last segment and the user id the one before it,
    /// so `user-documents/u1/report.pdf` and `/u1/report.pdf` both resolve
    /// to `(u1, report.pdf)`.
    pub fn target(&self) -> Result<UploadTarget> {
        let segments: Vec<&str> = self
            .storage_path
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        if segments.len() < 2 {
            bail!(
                "invalid storage path '{}': expected <user id>/<file name>",
                self.storage_path
            );
        }
        Ok(UploadTarget {
            user_id: segments[segments.len() - 2].to_string(),
            file_name: segments[segments.len() - 1].to_string(),
        })
    }

    /// Best-effort file name for outcome messages when the path is malformed.
    pub fn display_name(&self) -> &str {
        self.storage_path
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or(&self.storage_path)
    }
}

/// Per-user set of remote vector-store identifiers, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserIndexRecord {
    pub user_id: String,
    pub vector_store_ids: Vec<String>,
}

impl UserIndexRecord {
    pub fn first(&self) -> Option<&str> {
        self.vector_store_ids.first().map(String::as_str)
    }
}

/// Ingestion state reported to clients polling a file's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    Uploading,
    Processing,
    Completed,
    Failed,
}

impl ProcessingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Uploading => "uploading",
            ProcessingState::Processing => "processing",
            ProcessingState::Completed => "completed",
            ProcessingState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "uploading" => Ok(ProcessingState::Uploading),
            "processing" => Ok(ProcessingState::Processing),
            "completed" => Ok(ProcessingState::Completed),
            "failed" => Ok(ProcessingState::Failed),
            other => bail!("unknown processing state: {}", other),
        }
    }
}

/// Persisted progress record for one (user, file) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingStatus {
    pub user_id: String,
    pub file_name: String,
    pub status: ProcessingState,
    pub progress_percentage: u8,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A chat session, owned by one user for its lifetime.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub session_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => bail!("unknown transcript role: {}", other),
        }
    }
}

/// One entry in a session transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptItem {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TranscriptItem {
    pub fn user(content: impl Into<String>, client_message_id: Option<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            client_message_id,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            client_message_id: None,
            created_at: Utc::now(),
        }
    }
}

/// Extra response metadata returned by the chat callable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMeta {
    pub session_id: String,
}

/// The `{success, message, data, meta?}` response shape shared by all
/// callables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<EnvelopeMeta>,
}

impl<T> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            meta: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            meta: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.meta = Some(EnvelopeMeta {
            session_id: session_id.into(),
        });
        self
    }
}
