//! Remote vector-index service contract.
//!
//! [`IndexService`] is the four calls the ingestion pipeline needs from a
//! managed vector store: create a store, upload a file, attach the file to a
//! store, and read the attachment status. [`OpenAIVectorStores`] implements
//! it against the OpenAI Files and Vector Stores APIs.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};

use crate::openai::{required_str, OpenAIClient};

/// Attachment lifecycle of a file inside a vector store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentState {
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl AttachmentState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentStatus {
    pub state: AttachmentState,
    /// Service-reported detail for failed attachments.
    pub last_error: Option<String>,
}

impl AttachmentStatus {
    pub fn in_progress() -> Self {
        Self {
            state: AttachmentState::InProgress,
            last_error: None,
        }
    }

    pub fn completed() -> Self {
        Self {
            state: AttachmentState::Completed,
            last_error: None,
        }
    }
}

#[async_trait]
pub trait IndexService: Send + Sync {
    /// Upload a file object; returns its id.
    async fn upload_file(&self, file_name: &str, mime_type: &str, content: Bytes) -> Result<String>;

    /// Create a store that expires `expires_after_days` after last activity; returns its id.
    async fn create_vector_store(&self, name: &str, expires_after_days: u32) -> Result<String>;

    async fn attach_file(&self, vector_store_id: &str, file_id: &str) -> Result<()>;

    async fn attachment_status(&self, vector_store_id: &str, file_id: &str) -> Result<AttachmentStatus>;
}

pub struct OpenAIVectorStores {
    client: OpenAIClient,
}

impl OpenAIVectorStores {
    pub fn new(client: OpenAIClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IndexService for OpenAIVectorStores {
    async fn upload_file(&self, file_name: &str, mime_type: &str, content: Bytes) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(content.to_vec())
            .file_name(file_name.to_string())
            .mime_str(mime_type)?;
        let form = reqwest::multipart::Form::new()
            .text("purpose", "assistants")
            .part("file", part);

        let json = self.client.post_multipart("files", form).await?;
        let id = required_str(&json, "id")?.to_string();
        tracing::info!(file_id = %id, file_name, "File uploaded");
        Ok(id)
    }

    async fn create_vector_store(&self, name: &str, expires_after_days: u32) -> Result<String> {
        let body = json!({
            "name": name,
            "expires_after": { "anchor": "last_active_at", "days": expires_after_days },
        });
        let json = self.client.post_json("vector_stores", &body).await?;
        Ok(required_str(&json, "id")?.to_string())
    }

    async fn attach_file(&self, vector_store_id: &str, file_id: &str) -> Result<()> {
        let path = format!("vector_stores/{}/files", vector_store_id);
        self.client
            .post_json(&path, &json!({ "file_id": file_id }))
            .await?;
        Ok(())
    }

    async fn attachment_status(&self, vector_store_id: &str, file_id: &str) -> Result<AttachmentStatus> {
        let path = format!("vector_stores/{}/files/{}", vector_store_id, file_id);
        let json = self.client.get_json(&path).await?;
        parse_attachment_status(&json)
    }
}

/// Parse a vector-store file object. Unknown states count as in progress.
pub fn parse_attachment_status(json: &Value) -> Result<AttachmentStatus> {
    let raw = required_str(json, "status")?;
    let state = AttachmentState::parse(raw).unwrap_or_else(|| {
        tracing::debug!(status = raw, "Unknown attachment status, treating as in progress");
        AttachmentState::InProgress
    });

    let last_error = match json.get("last_error") {
        Some(Value::Object(err)) => {
            let message = err.get("message").and_then(Value::as_str).unwrap_or("");
            match err.get("code").and_then(Value::as_str) {
                Some(code) if !message.is_empty() => Some(format!("{}: {}", code, message)),
                Some(code) => Some(code.to_string()),
                None if !message.is_empty() => Some(message.to_string()),
                None => None,
            }
        }
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    };

    Ok(AttachmentStatus { state, last_error })
}
