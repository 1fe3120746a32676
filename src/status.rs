//! Status Recorder.
//!
//! Tracks one pipeline run's progress in the [`StatusStore`] so clients can
//! poll it:
//!
//! | Transition | State | Progress |
//! |------------|-------|----------|
//! | file arrived | `uploading` | 0 |
//! | [`Stage::Extract`] | `processing` | 20 |
//! | [`Stage::Upload`] | `processing` | 40 |
//! | [`Stage::Attach`] | `processing` | 60 |
//! | [`Stage::Await`] | `processing` | 80 |
//! | [`Stage::Register`] | `processing` | 90 |
//! | done | `completed` | 100 |
//! | any failure | `failed` | unchanged |
//!
//! Writes are best-effort: a failed write is logged and the run continues.

use std::sync::Arc;

use chrono::Utc;

use crate::models::{ProcessingState, ProcessingStatus};
use crate::store::StatusStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Upload,
    Attach,
    Await,
    Register,
}

impl Stage {
    pub fn progress(&self) -> u8 {
        match self {
            Stage::Extract => 20,
            Stage::Upload => 40,
            Stage::Attach => 60,
            Stage::Await => 80,
            Stage::Register => 90,
        }
    }
}

#[derive(Clone)]
pub struct StatusRecorder {
    store: Arc<dyn StatusStore>,
}

impl StatusRecorder {
    pub fn new(store: Arc<dyn StatusStore>) -> Self {
        Self { store }
    }

    /// Record the `uploading` status for a newly arrived file.
    pub async fn begin(&self, user_id: &str, file_name: &str) -> StatusTracker {
        let now = Utc::now();
        let tracker = StatusTracker {
            store: self.store.clone(),
            status: ProcessingStatus {
                user_id: user_id.to_string(),
                file_name: file_name.to_string(),
                status: ProcessingState::Uploading,
                progress_percentage: 0,
                started_at: now,
                updated_at: now,
                error: None,
            },
        };
        tracker.write().await;
        tracker
    }
}

/// Status of one in-flight run.
pub struct StatusTracker {
    store: Arc<dyn StatusStore>,
    status: ProcessingStatus,
}

impl StatusTracker {
    pub fn current(&self) -> &ProcessingStatus {
        &self.status
    }

    pub async fn stage(&mut self, stage: Stage) {
        self.transition(ProcessingState::Processing, stage.progress(), None)
            .await;
    }

    pub async fn complete(&mut self) {
        self.transition(ProcessingState::Completed, 100, None).await;
    }

    pub async fn fail(&mut self, error: impl Into<String>) {
        let progress = self.status.progress_percentage;
        self.transition(ProcessingState::Failed, progress, Some(error.into()))
            .await;
    }

    async fn transition(&mut self, state: ProcessingState, progress: u8, error: Option<String>) {
        self.status.status = state;
        self.status.progress_percentage = progress;
        self.status.updated_at = Utc::now();
        self.status.error = error;
        self.write().await;
    }

    async fn write(&self) {
        if let Err(e) = self.store.put_status(&self.status).await {
            tracing::warn!(
                user_id = %self.status.user_id,
                file_name = %self.status.file_name,
                status = self.status.status.as_str(),
                error = %e,
                "Failed to record processing status"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use anyhow::Result;
    use async_trait::async_trait;

    struct BrokenStore;

    #[async_trait]
    impl StatusStore for BrokenStore {
        async fn put_status(&self, _status: &ProcessingStatus) -> Result<()> {
            anyhow::bail!("database is locked")
        }
        async fn get_status(&self, _u: &str, _f: &str) -> Result<Option<ProcessingStatus>> {
            Ok(None)
        }
        async fn list_statuses(&self, _u: &str) -> Result<Vec<ProcessingStatus>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_transitions_are_persisted() {
        let store = Arc::new(InMemoryStore::new());
        let recorder = StatusRecorder::new(store.clone());

        let mut tracker = recorder.begin("u1", "a.pdf").await;
        let initial = store.get_status("u1", "a.pdf").await.unwrap().unwrap();
        assert_eq!(initial.status, ProcessingState::Uploading);
        assert_eq!(initial.progress_percentage, 0);

        tracker.stage(Stage::Attach).await;
        let mid = store.get_status("u1", "a.pdf").await.unwrap().unwrap();
        assert_eq!(mid.status, ProcessingState::Processing);
        assert_eq!(mid.progress_percentage, 60);
        assert_eq!(mid.started_at, initial.started_at);

        tracker.complete().await;
        let done = store.get_status("u1", "a.pdf").await.unwrap().unwrap();
        assert_eq!(done.status, ProcessingState::Completed);
        assert_eq!(done.progress_percentage, 100);
    }

    #[tokio::test]
    async fn test_failure_keeps_progress_and_records_error() {
        let store = Arc::new(InMemoryStore::new());
        let recorder = StatusRecorder::new(store.clone());

        let mut tracker = recorder.begin("u1", "a.pdf").await;
        tracker.stage(Stage::Upload).await;
        tracker.fail("Upload failed: timeout").await;

        let status = store.get_status("u1", "a.pdf").await.unwrap().unwrap();
        assert_eq!(status.status, ProcessingState::Failed);
        assert_eq!(status.progress_percentage, 40);
        assert_eq!(status.error.as_deref(), Some("Upload failed: timeout"));
    }

    #[tokio::test]
    async fn test_write_failures_do_not_propagate() {
        let recorder = StatusRecorder::new(Arc::new(BrokenStore));
        let mut tracker = recorder.begin("u1", "a.pdf").await;
        tracker.stage(Stage::Extract).await;
        tracker.complete().await;
        assert_eq!(tracker.current().status, ProcessingState::Completed);
    }
}
