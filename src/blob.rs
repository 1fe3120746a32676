//! Blob fetching from object storage.
//!
//! [`BlobStore`] retrieves an object's bytes by bucket and path. Backends:
//!
//! - **[`FsBlobStore`]**: objects on local disk at `<root>/<bucket>/<path>`.
//! - **[`S3BlobStore`](crate::blob_s3::S3BlobStore)**: any S3-compatible
//!   object store, signed with AWS SigV4.
//! - **[`MemoryBlobStore`]**: a map of objects held in memory.
//!
//! Use [`create_blob_store`] to build the backend named in `[storage]`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::blob_s3::S3BlobStore;
use crate::config::StorageConfig;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Backend identifier (e.g. `"s3"`, `"filesystem"`).
    fn backend(&self) -> &str;

    /// Download the object at `path` in `bucket`.
    async fn fetch(&self, bucket: &str, path: &str) -> Result<Bytes>;
}

pub fn create_blob_store(config: &StorageConfig) -> Result<Arc<dyn BlobStore>> {
    match config.backend.as_str() {
        "filesystem" => Ok(Arc::new(FsBlobStore::new(config.root.clone()))),
        "s3" => Ok(Arc::new(S3BlobStore::from_env(config.clone())?)),
        other => bail!("Unknown storage backend: {}", other),
    }
}

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn object_path(&self, bucket: &str, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || bucket.contains('/') || bucket.contains("..") {
            bail!("refusing object path outside storage root: {}/{}", bucket, path);
        }
        Ok(self.root.join(bucket).join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    fn backend(&self) -> &str {
        "filesystem"
    }

    async fn fetch(&self, bucket: &str, path: &str) -> Result<Bytes> {
        let full = self.object_path(bucket, path)?;
        let data = tokio::fs::read(&full)
            .await
            .with_context(|| format!("Failed to read object {}", full.display()))?;
        Ok(Bytes::from(data))
    }
}

/// In-memory object store keyed by `(bucket, path)`.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<(String, String), Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, bucket: &str, path: &str, data: impl Into<Bytes>) {
        self.objects
            .write()
            .await
            .insert((bucket.to_string(), path.to_string()), data.into());
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn fetch(&self, bucket: &str, path: &str) -> Result<Bytes> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
            .with_context(|| format!("object not found: {}/{}", bucket, path))
    }
}
