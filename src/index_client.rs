//! Remote Index Client.
//!
//! Drives one file through the managed vector-index service:
//!
//! 1. [`upload`](RemoteIndexClient::upload) the buffer as a file object,
//!    releasing the buffer afterwards whatever the outcome.
//! 2. [`resolve_or_create`](RemoteIndexClient::resolve_or_create) the user's
//!    store: reuse the first registered id, or create one that expires after
//!    a period of inactivity.
//! 3. [`attach`](RemoteIndexClient::attach) the file to the store.
//! 4. [`await_completion`](RemoteIndexClient::await_completion): poll the
//!    attachment at a fixed interval until it is terminal, the ceiling
//!    passes, or the caller cancels.
//!
//! Polling suspends only the calling task, so many runs can wait at once.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::buffer::{release_with_retry, BufferHandle, ReleasePolicy};
use crate::config::PipelineConfig;
use crate::models::UserIndexRecord;
use crate::vector_store::{AttachmentState, IndexService};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("{operation} failed: {message}")]
    Remote {
        operation: &'static str,
        message: String,
    },

    #[error("File processing failed: {0}")]
    ProcessingFailed(String),

    #[error("File processing was cancelled")]
    Cancelled,

    #[error("Timeout: File processing did not complete within {0} seconds")]
    Timeout(u64),

    #[error("Waiting for file processing was aborted")]
    Aborted,
}

impl IndexError {
    fn remote(operation: &'static str, err: anyhow::Error) -> Self {
        IndexError::Remote {
            operation,
            message: format!("{:#}", err),
        }
    }
}

/// Fixed-cadence polling bounded by a wall-clock ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub ceiling: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            ceiling: Duration::from_secs(30),
        }
    }
}

impl PollPolicy {
    /// Number of status checks that fit under the ceiling.
    pub fn max_polls(&self) -> u32 {
        let interval = self.interval.as_millis().max(1);
        (self.ceiling.as_millis() / interval).max(1) as u32
    }
}

/// Store id chosen for a run and whether this run created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIndex {
    pub vector_store_id: String,
    pub created: bool,
}

pub struct RemoteIndexClient {
    service: Arc<dyn IndexService>,
    poll: PollPolicy,
    release: ReleasePolicy,
    expires_after_days: u32,
}

impl RemoteIndexClient {
    pub fn new(service: Arc<dyn IndexService>) -> Self {
        Self {
            service,
            poll: PollPolicy::default(),
            release: ReleasePolicy::default(),
            expires_after_days: 30,
        }
    }

    pub fn from_config(service: Arc<dyn IndexService>, config: &PipelineConfig) -> Self {
        Self {
            service,
            poll: PollPolicy {
                interval: config.poll_interval(),
                ceiling: config.await_max(),
            },
            release: ReleasePolicy {
                max_attempts: config.release_max_attempts,
                backoff: config.release_backoff(),
            },
            expires_after_days: config.expires_after_days,
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn release_policy(&self) -> &ReleasePolicy {
        &self.release
    }

    /// Upload the buffer's contents; the buffer is released on every path.
    pub async fn upload(&self, buffer: &mut dyn BufferHandle) -> Result<String, IndexError> {
        let result = match buffer.contents() {
            Ok(content) => {
                self.service
                    .upload_file(buffer.name(), buffer.mime_type(), content)
                    .await
            }
            Err(e) => Err(e),
        };
        release_with_retry(buffer, &self.release).await;
        result.map_err(|e| IndexError::remote("Upload", e))
    }

    pub async fn resolve_or_create(
        &self,
        user_id: &str,
        record: Option<&UserIndexRecord>,
    ) -> Result<ResolvedIndex, IndexError> {
        if let Some(id) = record.and_then(UserIndexRecord::first) {
            tracing::info!(user_id, vector_store_id = id, "Using existing vector store");
            return Ok(ResolvedIndex {
                vector_store_id: id.to_string(),
                created: false,
            });
        }

        let name = format!("Vector Store for {}", user_id);
        let id = self
            .service
            .create_vector_store(&name, self.expires_after_days)
            .await
            .map_err(|e| IndexError::remote("Vector store creation", e))?;
        tracing::info!(user_id, vector_store_id = %id, "Created new vector store");
        Ok(ResolvedIndex {
            vector_store_id: id,
            created: true,
        })
    }

    pub async fn attach(&self, vector_store_id: &str, file_id: &str) -> Result<(), IndexError> {
        self.service
            .attach_file(vector_store_id, file_id)
            .await
            .map_err(|e| IndexError::remote("Attach", e))?;
        tracing::info!(vector_store_id, file_id, "File attached to vector store");
        Ok(())
    }

    /// Poll until the attachment completes. Failed and cancelled states
    /// return immediately; a non-terminal state after the ceiling is a
    /// timeout.
    pub async fn await_completion(
        &self,
        vector_store_id: &str,
        file_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), IndexError> {
        for poll in 1..=self.poll.max_polls() {
            let status = self
                .service
                .attachment_status(vector_store_id, file_id)
                .await
                .map_err(|e| IndexError::remote("Status check", e))?;

            match status.state {
                AttachmentState::Completed => {
                    tracing::info!(vector_store_id, file_id, polls = poll, "File processing completed");
                    return Ok(());
                }
                AttachmentState::Failed => {
                    return Err(IndexError::ProcessingFailed(
                        status.last_error.unwrap_or_else(|| "unknown error".to_string()),
                    ));
                }
                AttachmentState::Cancelled => return Err(IndexError::Cancelled),
                AttachmentState::InProgress => {
                    tracing::debug!(vector_store_id, file_id, poll, "File still processing");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(IndexError::Aborted),
                _ = tokio::time::sleep(self.poll.interval) => {}
            }
        }

        Err(IndexError::Timeout(self.poll.ceiling.as_secs()))
    }
}
