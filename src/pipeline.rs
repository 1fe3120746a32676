//! Pipeline Orchestrator.
//!
//! One [`Pipeline::run`] moves one uploaded file through:
//!
//! ```text
//! classify → (reject) → fetch + extract → upload → resolve index
//!          → attach → await completion → register → done
//! ```
//!
//! The first failing stage ends the run. Nothing is rolled back: an uploaded
//! file object or a freshly created store stays on the remote service. Every
//! in-memory buffer is released before `run` returns, on every path.
//!
//! A run that has to create a user's first store holds that user's creation
//! lock until the store is registered, so concurrent first uploads for one
//! user end up in a single store.
//!
//! `run` never fails; it reports a [`PipelineOutcome`] whose `Display` form is
//! the human-readable result line.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::blob::BlobStore;
use crate::buffer::{release_with_retry, BufferHandle, FileBuffer};
use crate::classify::{classify, supported_extensions_list, Classification, FileType};
use crate::extract::{ContentExtractor, Extracted};
use crate::index_client::{RemoteIndexClient, ResolvedIndex};
use crate::models::{UploadEvent, UploadTarget};
use crate::status::{Stage, StatusRecorder, StatusTracker};
use crate::store::IndexRegistry;

/// What gets uploaded to the index service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// PDFs and images are converted to markdown first; other documents go as-is.
    Extracted,
    /// The original bytes for every accepted file except images, which the
    /// index service cannot read and are always described first.
    Raw,
}

impl FromStr for UploadMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "extracted" => Ok(UploadMode::Extracted),
            "raw" => Ok(UploadMode::Raw),
            other => bail!("Unknown upload mode: {}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Succeeded {
        file_name: String,
        file_type: FileType,
    },
    Unsupported {
        file_name: String,
        file_type: FileType,
    },
    Failed {
        file_name: String,
        file_type: FileType,
        error: String,
    },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Succeeded { .. })
    }
}

impl fmt::Display for PipelineOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineOutcome::Succeeded {
                file_name,
                file_type,
            } => write!(
                f,
                "{} ({}) - OpenAI Vector Store pipeline successful! File vectorized and stored in OpenAI Vector Store.",
                file_name, file_type
            ),
            PipelineOutcome::Unsupported {
                file_name,
                file_type,
            } => write!(
                f,
                "{} ({}) - File type not supported by OpenAI FileSearch. Supported types: {}",
                file_name,
                file_type,
                supported_extensions_list()
            ),
            PipelineOutcome::Failed {
                file_name,
                file_type,
                error,
            } => write!(
                f,
                "{} ({}) - OpenAI Vector Store processing failed: {}",
                file_name, file_type, error
            ),
        }
    }
}

/// Per-user locks taken while a user's first store is created and registered.
#[derive(Default)]
struct CreationLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CreationLocks {
    async fn lock(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(user_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct Pipeline {
    blobs: Arc<dyn BlobStore>,
    extractor: Arc<ContentExtractor>,
    index: RemoteIndexClient,
    registry: Arc<dyn IndexRegistry>,
    status: StatusRecorder,
    upload_mode: UploadMode,
    accept_images: bool,
    creating: CreationLocks,
}

impl Pipeline {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<ContentExtractor>,
        index: RemoteIndexClient,
        registry: Arc<dyn IndexRegistry>,
        status: StatusRecorder,
    ) -> Self {
        Self {
            blobs,
            extractor,
            index,
            registry,
            status,
            upload_mode: UploadMode::Extracted,
            accept_images: false,
            creating: CreationLocks::default(),
        }
    }

    pub fn with_upload_mode(mut self, mode: UploadMode) -> Self {
        self.upload_mode = mode;
        self
    }

    /// Route images through the vision extractor instead of rejecting them.
    pub fn with_images(mut self, accept: bool) -> Self {
        self.accept_images = accept;
        self
    }

    fn accepts(&self, classification: &Classification) -> bool {
        classification.is_supported()
            || (self.accept_images && classification.file_type == FileType::Image)
    }

    pub async fn run(&self, event: &UploadEvent, cancel: &CancellationToken) -> PipelineOutcome {
        let target = match event.target() {
            Ok(target) => target,
            Err(e) => {
                let file_name = event.display_name().to_string();
                let file_type = classify(&file_name).file_type;
                tracing::warn!(path = %event.storage_path, error = %e, "Rejected upload event");
                return PipelineOutcome::Failed {
                    file_name,
                    file_type,
                    error: e.to_string(),
                };
            }
        };

        let classification = classify(&target.file_name);
        let file_type = classification.file_type;
        tracing::info!(
            user_id = %target.user_id,
            file_name = %target.file_name,
            bucket = %event.bucket_name,
            extension = %classification.extension,
            file_type = %file_type,
            "Pipeline started"
        );

        let mut tracker = self.status.begin(&target.user_id, &target.file_name).await;

        if !self.accepts(&classification) {
            let outcome = PipelineOutcome::Unsupported {
                file_name: target.file_name.clone(),
                file_type,
            };
            tracker.fail(outcome.to_string()).await;
            tracing::info!(file_name = %target.file_name, "File type not supported");
            return outcome;
        }

        match self
            .process(event, &target, &classification, &mut tracker, cancel)
            .await
        {
            Ok(()) => {
                tracker.complete().await;
                tracing::info!(
                    user_id = %target.user_id,
                    file_name = %target.file_name,
                    "Pipeline completed"
                );
                PipelineOutcome::Succeeded {
                    file_name: target.file_name,
                    file_type,
                }
            }
            Err(e) => {
                let error = format!("{:#}", e);
                tracker.fail(error.clone()).await;
                tracing::error!(
                    user_id = %target.user_id,
                    file_name = %target.file_name,
                    error = %error,
                    "Pipeline failed"
                );
                PipelineOutcome::Failed {
                    file_name: target.file_name,
                    file_type,
                    error,
                }
            }
        }
    }

    async fn process(
        &self,
        event: &UploadEvent,
        target: &UploadTarget,
        classification: &Classification,
        tracker: &mut StatusTracker,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tracker.stage(Stage::Extract).await;
        let content = self
            .blobs
            .fetch(&event.bucket_name, &event.storage_path)
            .await
            .with_context(|| format!("Failed to download {}", event.storage_path))?;

        let mut source = FileBuffer::new(
            target.file_name.clone(),
            classification.mime_type(),
            content,
        );
        let result = self
            .index_buffered(&mut source, target, classification, tracker, cancel)
            .await;
        release_with_retry(&mut source, self.index.release_policy()).await;
        result
    }

    async fn index_buffered(
        &self,
        source: &mut FileBuffer,
        target: &UploadTarget,
        classification: &Classification,
        tracker: &mut StatusTracker,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let extract = match self.upload_mode {
            UploadMode::Extracted => true,
            UploadMode::Raw => classification.file_type == FileType::Image,
        };
        let mut markdown = if extract {
            match self
                .extractor
                .extract(classification, source.contents()?)
                .await?
            {
                Extracted::Markdown(md) => Some(FileBuffer::new(
                    format!("{}.md", target.file_name),
                    "text/markdown",
                    Bytes::from(md),
                )),
                Extracted::Original => None,
            }
        } else {
            None
        };

        tracker.stage(Stage::Upload).await;
        let file_id = match markdown.as_mut() {
            Some(buffer) => self.index.upload(buffer).await?,
            None => self.index.upload(source).await?,
        };

        let (resolved, _creating) = self.resolve_index(&target.user_id).await?;

        tracker.stage(Stage::Attach).await;
        self.index
            .attach(&resolved.vector_store_id, &file_id)
            .await?;

        tracker.stage(Stage::Await).await;
        self.index
            .await_completion(&resolved.vector_store_id, &file_id, cancel)
            .await?;

        tracker.stage(Stage::Register).await;
        let record = self
            .registry
            .upsert(&target.user_id, &resolved.vector_store_id)
            .await
            .context("Failed to update index registry")?;
        if record.vector_store_ids.is_empty() {
            return Err(anyhow!("index registry for {} is empty after upsert", target.user_id));
        }
        tracing::info!(
            user_id = %target.user_id,
            vector_store_id = %resolved.vector_store_id,
            created = resolved.created,
            stores = record.vector_store_ids.len(),
            "Index registry updated"
        );
        Ok(())
    }

    /// Reuse the user's first registered store, or create one while holding
    /// the user's creation lock. The guard is returned only when a store was
    /// created and must be kept until that store is registered.
    async fn resolve_index(
        &self,
        user_id: &str,
    ) -> Result<(ResolvedIndex, Option<OwnedMutexGuard<()>>)> {
        let record = self
            .registry
            .get(user_id)
            .await
            .context("Failed to read index registry")?;
        if let Some(record) = record.filter(|r| r.first().is_some()) {
            let resolved = self.index.resolve_or_create(user_id, Some(&record)).await?;
            return Ok((resolved, None));
        }

        let guard = self.creating.lock(user_id).await;
        // Another run may have registered a store while this one waited.
        let record = self
            .registry
            .get(user_id)
            .await
            .context("Failed to read index registry")?;
        let resolved = self
            .index
            .resolve_or_create(user_id, record.as_ref())
            .await?;
        let guard = resolved.created.then_some(guard);
        Ok((resolved, guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_strings() {
        let ok = PipelineOutcome::Succeeded {
            file_name: "report.pdf".to_string(),
            file_type: FileType::Pdf,
        };
        assert_eq!(
            ok.to_string(),
            "report.pdf (PDF) - OpenAI Vector Store pipeline successful! File vectorized and stored in OpenAI Vector Store."
        );

        let failed = PipelineOutcome::Failed {
            file_name: "notes.docx".to_string(),
            file_type: FileType::Document,
            error: "File processing was cancelled".to_string(),
        };
        assert_eq!(
            failed.to_string(),
            "notes.docx (DOCUMENT) - OpenAI Vector Store processing failed: File processing was cancelled"
        );

        let unsupported = PipelineOutcome::Unsupported {
            file_name: "photo.xyz".to_string(),
            file_type: FileType::Unsupported,
        };
        let text = unsupported.to_string();
        assert!(text.starts_with("photo.xyz (UNSUPPORTED) - File type not supported"));
        assert!(text.ends_with(&supported_extensions_list()));
    }

    #[test]
    fn test_upload_mode_parse() {
        assert_eq!("raw".parse::<UploadMode>().unwrap(), UploadMode::Raw);
        assert_eq!(
            "extracted".parse::<UploadMode>().unwrap(),
            UploadMode::Extracted
        );
        assert!("zip".parse::<UploadMode>().is_err());
    }
}
