//! Binary object storage used for source uploads and converted outputs.

pub mod s3;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::progress::ProgressReporter;
use crate::infrastructure::ffmpeg::MediaInfo;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Which bucket an object lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// Original uploads.
    Source,
    /// Converted outputs.
    Converted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub size: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Streams the source object `id` into `dest`, reporting 0-100 on
    /// `progress`. Returns the number of bytes written.
    async fn download(&self, id: &str, dest: &Path, progress: ProgressReporter)
    -> StorageResult<u64>;

    /// Uploads a converted output. `media` is recorded alongside the object so
    /// [`ObjectStore::metadata`] can report its dimensions.
    async fn upload(
        &self,
        local_path: &Path,
        name: &str,
        media: Option<&MediaInfo>,
    ) -> StorageResult<StoredObject>;

    async fn delete(&self, bucket: Bucket, id: &str) -> StorageResult<()>;

    /// Size and dimensions of a converted output.
    async fn metadata(&self, id: &str) -> StorageResult<ObjectMetadata>;
}
