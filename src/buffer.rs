//! In-memory file buffers with guaranteed, retried release.
//!
//! A pipeline run holds the downloaded object (and, in `extracted` mode, the
//! generated markdown) in memory until the upload finishes. Every exit path
//! releases those buffers through [`release_with_retry`], which applies a
//! [`ReleasePolicy`]: up to `max_attempts` tries spaced by a fixed `backoff`.
//! A release that keeps failing is logged and swallowed; it never turns a
//! run into a failure.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Bounded-retry policy applied when releasing a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleasePolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for ReleasePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_secs(1),
        }
    }
}

/// A named, releasable handle over file contents.
///
/// Releasing an already-released handle must succeed, so callers on
/// overlapping cleanup paths can release unconditionally.
#[async_trait]
pub trait BufferHandle: Send + Sync {
    fn name(&self) -> &str;

    fn mime_type(&self) -> &str;

    /// Contents of the buffer. Errors once the buffer has been released.
    fn contents(&self) -> Result<Bytes>;

    fn is_released(&self) -> bool;

    async fn release(&mut self) -> Result<()>;
}

/// Plain in-memory buffer.
#[derive(Debug)]
pub struct FileBuffer {
    name: String,
    mime_type: String,
    data: Option<Bytes>,
}

impl FileBuffer {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: Some(data),
        }
    }

    pub fn len(&self) -> usize {
        self.data.as_ref().map(Bytes::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BufferHandle for FileBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn contents(&self) -> Result<Bytes> {
        self.data
            .clone()
            .ok_or_else(|| anyhow!("buffer '{}' was already released", self.name))
    }

    fn is_released(&self) -> bool {
        self.data.is_none()
    }

    async fn release(&mut self) -> Result<()> {
        self.data = None;
        Ok(())
    }
}

/// Release `buffer`, retrying per `policy`. Returns whether the buffer ended
/// up released.
pub async fn release_with_retry<B>(buffer: &mut B, policy: &ReleasePolicy) -> bool
where
    B: BufferHandle + ?Sized,
{
    if buffer.is_released() {
        return true;
    }

    for attempt in 1..=policy.max_attempts {
        match buffer.release().await {
            Ok(()) => return true,
            Err(e) => {
                tracing::warn!(
                    buffer = buffer.name(),
                    attempt,
                    error = %e,
                    "Failed to release in-memory buffer"
                );
                if attempt == policy.max_attempts {
                    tracing::error!(
                        buffer = buffer.name(),
                        attempts = policy.max_attempts,
                        "Giving up releasing in-memory buffer"
                    );
                    break;
                }
                tokio::time::sleep(policy.backoff).await;
            }
        }
    }
    false
}
