use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use super::error::ConversionResult;
use super::retry::RetryEngine;
use crate::common::fs::{discard, file_component};
use crate::common::progress::ProgressReporter;
use crate::config::settings::{VideoConfig, target_width};
use crate::infrastructure::ffmpeg::{MediaInfo, Transcoder};
use crate::infrastructure::storage::{ObjectStore, StoredObject};

/// Share of a format's progress spent transcoding; the rest covers upload.
const TRANSCODE_CEILING: u8 = 95;

#[derive(Debug, Clone)]
pub struct ProcessedFormat {
    pub object: StoredObject,
    pub attempts: u32,
    /// Probed from the local output before upload, if that worked.
    pub media: Option<MediaInfo>,
}

/// Takes one format from source file to uploaded output.
pub struct FormatProcessor {
    retry: RetryEngine,
    transcoder: Arc<dyn Transcoder>,
    storage: Arc<dyn ObjectStore>,
    output_dir: PathBuf,
}

impl FormatProcessor {
    pub fn new(
        transcoder: Arc<dyn Transcoder>,
        storage: Arc<dyn ObjectStore>,
        config: &VideoConfig,
    ) -> Self {
        Self {
            retry: RetryEngine::new(transcoder.clone(), config),
            transcoder,
            storage,
            output_dir: config.output_dir.clone(),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.retry.max_retries()
    }

    pub fn output_path(&self, job_id: &str, format: &str) -> PathBuf {
        self.output_dir.join(format!(
            "{}_{}_final.mp4",
            file_component(job_id),
            file_component(format)
        ))
    }

    pub async fn process(
        &self,
        source: &Path,
        job_id: &str,
        format: &str,
        progress: ProgressReporter,
    ) -> ConversionResult<ProcessedFormat> {
        let width = target_width(format);
        let output = self.output_path(job_id, format);
        tokio::fs::create_dir_all(&self.output_dir).await?;

        info!(job_id, format, width, "Converting format");
        let outcome = self
            .retry
            .attempt_with_retry(source, &output, width, progress.scoped(0, TRANSCODE_CEILING))
            .await?;

        let media = match self.transcoder.inspect(&outcome.output).await {
            Ok(media) => Some(media),
            Err(e) => {
                warn!(job_id, format, error = %e, "Could not probe converted output");
                None
            }
        };

        let name = format!("{}_{}.mp4", file_component(format), file_component(job_id));
        let uploaded = self
            .storage
            .upload(&outcome.output, &name, media.as_ref())
            .await;
        discard(&outcome.output).await;
        let object = uploaded?;

        progress.report(100);
        info!(job_id, format, object_id = %object.id, attempts = outcome.attempts, "✅ Format uploaded");

        Ok(ProcessedFormat {
            object,
            attempts: outcome.attempts,
            media,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::conversion::error::ConversionError;
    use crate::testing::{MemoryObjectStore, ScaleBehavior, ScriptedTranscoder, dir_entries};
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> VideoConfig {
        VideoConfig {
            output_dir: dir.path().join("out"),
            temp_dir: dir.path().join("tmp"),
            retry_delay: Duration::from_millis(1),
            ..VideoConfig::default()
        }
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<u8>) -> Vec<u8> {
        let mut values = Vec::new();
        while let Ok(value) = rx.try_recv() {
            values.push(value);
        }
        values
    }

    #[tokio::test]
    async fn uploads_output_and_reports_full_only_after_upload() {
        let dir = TempDir::new().unwrap();
        let transcoder = Arc::new(ScriptedTranscoder::new(1920));
        let storage = Arc::new(MemoryObjectStore::default());
        let processor = FormatProcessor::new(transcoder.clone(), storage.clone(), &config(&dir));
        let (reporter, mut rx) = ProgressReporter::channel();

        let processed = processor
            .process(Path::new("source.mp4"), "job-1", "720p", reporter)
            .await
            .unwrap();

        assert_eq!(processed.attempts, 1);
        assert_eq!(transcoder.calls()[0].target_width, 1280);

        let uploads = storage.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].name, "720p_job-1.mp4");
        assert_eq!(uploads[0].media.map(|m| m.width), Some(1280));
        assert_eq!(processed.object.id, uploads[0].id);

        let values = drain(&mut rx);
        assert_eq!(values.last(), Some(&100));
        let before_upload = &values[..values.len() - 1];
        assert!(before_upload.iter().all(|v| *v <= TRANSCODE_CEILING));
        assert!(before_upload.contains(&TRANSCODE_CEILING));

        // Local output is cleaned up once uploaded.
        assert!(dir_entries(&dir.path().join("out")).is_empty());
    }

    #[tokio::test]
    async fn unknown_format_uses_default_width() {
        let dir = TempDir::new().unwrap();
        let transcoder = Arc::new(ScriptedTranscoder::new(1920));
        let storage = Arc::new(MemoryObjectStore::default());
        let processor = FormatProcessor::new(transcoder.clone(), storage, &config(&dir));

        processor
            .process(Path::new("source.mp4"), "job-1", "900p", ProgressReporter::detached())
            .await
            .unwrap();

        assert_eq!(transcoder.calls()[0].target_width, 1280);
    }

    #[tokio::test]
    async fn exhaustion_propagates_without_upload() {
        let dir = TempDir::new().unwrap();
        let transcoder = Arc::new(ScriptedTranscoder::new(1920).always(ScaleBehavior::Fail));
        let storage = Arc::new(MemoryObjectStore::default());
        let processor = FormatProcessor::new(transcoder.clone(), storage.clone(), &config(&dir));

        let err = processor
            .process(Path::new("source.mp4"), "job-1", "480p", ProgressReporter::detached())
            .await
            .unwrap_err();

        assert!(matches!(err, ConversionError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(transcoder.call_count(), 3);
        assert!(storage.uploads().is_empty());
    }

    #[tokio::test]
    async fn upload_failure_is_reported_and_output_removed() {
        let dir = TempDir::new().unwrap();
        let transcoder = Arc::new(ScriptedTranscoder::new(1920));
        let storage = Arc::new(MemoryObjectStore::default());
        storage.fail_uploads(true);
        let processor = FormatProcessor::new(transcoder, storage, &config(&dir));

        let err = processor
            .process(Path::new("source.mp4"), "job-1", "480p", ProgressReporter::detached())
            .await
            .unwrap_err();

        assert_eq!(err.code(), "UPLOAD_FAILED");
        assert!(dir_entries(&dir.path().join("out")).is_empty());
    }

    #[test]
    fn output_path_is_sanitized() {
        let dir = TempDir::new().unwrap();
        let processor = FormatProcessor::new(
            Arc::new(ScriptedTranscoder::new(1920)),
            Arc::new(MemoryObjectStore::default()),
            &config(&dir),
        );
        let path = processor.output_path("job/1", "../4K");
        assert_eq!(path.parent(), Some(dir.path().join("out").as_path()));
        assert_eq!(path.file_name().unwrap(), "job_1____4K_final.mp4");
    }
}
