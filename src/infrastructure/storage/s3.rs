use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{Client, config::BehaviorVersion, config::Credentials, config::Region};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Bucket, ObjectMetadata, ObjectStore, StorageError, StorageResult, StoredObject};
use crate::common::progress::ProgressReporter;
use crate::infrastructure::ffmpeg::MediaInfo;

#[derive(Clone)]
pub struct StorageService {
    pub client: Client,
    pub source_bucket: String,
    pub converted_bucket: String,
}

impl StorageService {
    pub async fn new(
        endpoint: &str,
        source_bucket: &str,
        converted_bucket: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");

        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO
            .build();

        let client = Client::from_conf(config);

        info!("✅ Connected to S3 (MinIO)");

        Self {
            client,
            source_bucket: source_bucket.to_string(),
            converted_bucket: converted_bucket.to_string(),
        }
    }

    fn bucket(&self, bucket: Bucket) -> &str {
        match bucket {
            Bucket::Source => &self.source_bucket,
            Bucket::Converted => &self.converted_bucket,
        }
    }
}

#[async_trait]
impl ObjectStore for StorageService {
    async fn download(
        &self,
        id: &str,
        dest: &Path,
        progress: ProgressReporter,
    ) -> StorageResult<u64> {
        info!(file_id = %id, bucket = %self.source_bucket, "Downloading file");

        let response = self
            .client
            .get_object()
            .bucket(&self.source_bucket)
            .key(id)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound(id.to_string())
                } else {
                    StorageError::DownloadFailed(DisplayErrorContext(&e).to_string())
                }
            })?;

        let total = response
            .content_length()
            .and_then(|len| u64::try_from(len).ok())
            .filter(|len| *len > 0);
        let mut body = response.body;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        let mut last_reported = None;

        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;

            if let Some(total) = total {
                let percent = (written.saturating_mul(100) / total).min(100) as u8;
                if last_reported != Some(percent) {
                    progress.report(percent);
                    last_reported = Some(percent);
                }
            }
        }
        file.flush().await?;

        if written == 0 {
            return Err(StorageError::DownloadFailed(format!(
                "{} returned an empty body",
                id
            )));
        }

        progress.report(100);
        info!(file_id = %id, bytes = written, "⬇️ Downloaded file");
        Ok(written)
    }

    async fn upload(
        &self,
        local_path: &Path,
        name: &str,
        media: Option<&MediaInfo>,
    ) -> StorageResult<StoredObject> {
        let key = format!("{}/{}", Uuid::new_v4().simple(), name);
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        let content_type = mime_guess::from_path(name).first_or_octet_stream();

        let mut request = self
            .client
            .put_object()
            .bucket(&self.converted_bucket)
            .key(&key)
            .body(body)
            .content_type(content_type.essence_str());

        if let Some(media) = media {
            request = request
                .metadata("width", media.width.to_string())
                .metadata("height", media.height.to_string())
                .metadata("duration", media.duration.to_string());
        }

        request
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(DisplayErrorContext(&e).to_string()))?;

        info!(key = %key, bucket = %self.converted_bucket, "⬆️ Uploaded file");
        Ok(StoredObject {
            id: key,
            name: name.to_string(),
        })
    }

    async fn delete(&self, bucket: Bucket, id: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(self.bucket(bucket))
            .key(id)
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed(DisplayErrorContext(&e).to_string()))?;

        debug!(key = %id, "Deleted object");
        Ok(())
    }

    async fn metadata(&self, id: &str) -> StorageResult<ObjectMetadata> {
        let head = self
            .client
            .head_object()
            .bucket(&self.converted_bucket)
            .key(id)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    StorageError::NotFound(id.to_string())
                } else {
                    StorageError::Backend(DisplayErrorContext(&e).to_string())
                }
            })?;

        let user_metadata = head.metadata();
        let dimension = |key: &str| {
            user_metadata
                .and_then(|m| m.get(key))
                .and_then(|v| v.parse::<u32>().ok())
        };

        Ok(ObjectMetadata {
            size: head.content_length().and_then(|len| u64::try_from(len).ok()),
            width: dimension("width"),
            height: dimension("height"),
        })
    }
}
