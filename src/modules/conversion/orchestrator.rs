//! Per-job state machine: download, probe, then every requested format in
//! order, persisting after each step so a later run resumes where this one
//! stopped.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use time::OffsetDateTime;
use tracing::{error, info, warn};

use super::error::{ConversionError, ConversionResult};
use super::model::{
    ErrorRecord, FormatEntry, FormatStatus, JobState, JobStatus, UPSCALE_NOT_ALLOWED,
};
use super::processor::{FormatProcessor, ProcessedFormat};
use super::progress::aggregate;
use super::repository::MediaRepository;
use crate::common::fs::{discard, file_component};
use crate::common::progress::ProgressReporter;
use crate::config::settings::{VideoConfig, target_width};
use crate::infrastructure::ffmpeg::Transcoder;
use crate::infrastructure::storage::ObjectStore;

/// Outcome of one run, for logging by the caller.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub status: JobStatus,
    pub formats: Vec<FormatEntry>,
}

impl JobReport {
    pub fn count(&self, status: FormatStatus) -> usize {
        self.formats.iter().filter(|f| f.status == status).count()
    }
}

pub struct JobOrchestrator {
    media: MediaRepository,
    storage: Arc<dyn ObjectStore>,
    transcoder: Arc<dyn Transcoder>,
    processor: FormatProcessor,
    temp_dir: PathBuf,
}

impl JobOrchestrator {
    pub fn new(
        media: MediaRepository,
        storage: Arc<dyn ObjectStore>,
        transcoder: Arc<dyn Transcoder>,
        config: &VideoConfig,
    ) -> Self {
        Self {
            processor: FormatProcessor::new(transcoder.clone(), storage.clone(), config),
            media,
            storage,
            transcoder,
            temp_dir: config.temp_dir.clone(),
        }
    }

    pub async fn run(&self, job_id: &str) -> ConversionResult<JobReport> {
        let doc = self.media.get(job_id).await?;
        info!(job_id, formats = doc.formats.len(), "🎬 Starting conversion job");

        if doc.name.trim().is_empty() {
            self.media.set_name(job_id, &doc.display_name()).await?;
        }

        self.media.save_status(job_id, &JobStatus::downloading(0)).await?;

        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let source = self.temp_dir.join(format!("{}.mp4", file_component(job_id)));
        let result = self.convert(job_id, &doc.file_id, &source, doc.formats).await;
        discard(&source).await;

        match &result {
            Ok(report) => info!(
                job_id,
                complete = report.count(FormatStatus::Complete),
                skipped = report.count(FormatStatus::Skipped),
                failed = report.count(FormatStatus::Failed),
                "✅ Conversion job finished"
            ),
            Err(e) => error!(job_id, error = %e, "❌ Conversion job aborted"),
        }
        result
    }

    async fn convert(
        &self,
        job_id: &str,
        file_id: &str,
        source: &Path,
        mut formats: Vec<FormatEntry>,
    ) -> ConversionResult<JobReport> {
        self.download_source(job_id, file_id, source).await?;

        let source_info = self.transcoder.inspect(source).await?;
        info!(
            job_id,
            width = source_info.width,
            height = source_info.height,
            duration = source_info.duration,
            "Source probed"
        );

        self.media
            .save_status(job_id, &aggregate(&formats, None))
            .await?;

        // `formats` is refreshed from the store on every write, so entries
        // submitted during the run are picked up in order as well.
        let mut visited = HashSet::new();
        while let Some(mut entry) = next_unvisited(&formats, &mut visited) {
            if entry.status == FormatStatus::Complete {
                info!(job_id, format = %entry.format, "Already complete, skipping");
                continue;
            }

            entry.status = FormatStatus::Processing;
            entry.progress = 0;
            entry.retry_count = 0;
            entry.max_retries = self.processor.max_retries();
            entry.conversion_start = Some(OffsetDateTime::now_utc());
            entry.conversion_end = None;
            entry.processing_time = None;
            formats = self.persist(job_id, &entry).await?;

            let format = entry.format.clone();
            let width = target_width(&format);
            entry.target_width = Some(width);

            if width > source_info.width {
                warn!(job_id, format = %format, width, source_width = source_info.width, "Upscale refused");
                entry.status = FormatStatus::Skipped;
                entry.progress = 100;
                entry.conversion_end = Some(OffsetDateTime::now_utc());
                entry.errors.push(ErrorRecord::now(
                    format!(
                        "Target width {} exceeds source width {}",
                        width, source_info.width
                    ),
                    UPSCALE_NOT_ALLOWED,
                ));
                formats = self.persist(job_id, &entry).await?;
                continue;
            }

            let started = Instant::now();
            let (reporter, mut rx) = ProgressReporter::channel();
            let work = self.processor.process(source, job_id, &format, reporter);
            tokio::pin!(work);
            let result = loop {
                tokio::select! {
                    biased;
                    Some(percent) = rx.recv() => {
                        if entry.progress != percent {
                            entry.progress = percent;
                            if let Some(written) = self.persist_progress(job_id, &entry).await {
                                formats = written;
                            }
                        }
                    }
                    result = &mut work => break result,
                }
            };
            let elapsed = started.elapsed().as_secs_f64();

            match result {
                Ok(processed) => self.mark_complete(job_id, &mut entry, processed).await,
                Err(e) => {
                    error!(job_id, format = %format, error = %e, "Format failed");
                    entry.status = FormatStatus::Failed;
                    entry.progress = 100;
                    entry.retry_count = e.attempts().unwrap_or(1);
                    entry.errors.push(ErrorRecord::now(e.to_string(), e.code()));
                }
            }
            entry.conversion_end = Some(OffsetDateTime::now_utc());
            entry.processing_time = Some(elapsed);
            formats = self.persist(job_id, &entry).await?;
        }

        let status = JobStatus {
            progress: 100,
            job_end_timestamp: Some(OffsetDateTime::now_utc()),
            ..aggregate(&formats, Some(JobState::Complete))
        };
        self.media.save_status(job_id, &status).await?;

        Ok(JobReport { status, formats })
    }

    /// True while the job still has entries no run has picked up.
    pub async fn has_queued(&self, job_id: &str) -> ConversionResult<bool> {
        match self.media.get(job_id).await {
            Ok(doc) => Ok(doc.formats.iter().any(|f| f.status == FormatStatus::Queued)),
            Err(ConversionError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn download_source(&self, job_id: &str, file_id: &str, source: &Path) -> ConversionResult<()> {
        info!(job_id, file_id, "⬇️ Downloading original file");
        let (reporter, mut rx) = ProgressReporter::channel();
        let work = self.storage.download(file_id, source, reporter);
        tokio::pin!(work);
        let mut last = 0;
        let bytes = loop {
            tokio::select! {
                biased;
                Some(percent) = rx.recv() => self.save_download_tick(job_id, percent, &mut last).await,
                result = &mut work => {
                    // Ticks sent during the final poll are still queued.
                    while let Ok(percent) = rx.try_recv() {
                        self.save_download_tick(job_id, percent, &mut last).await;
                    }
                    break result?;
                }
            }
        };
        info!(job_id, bytes, "⬇️ Downloaded original file");
        Ok(())
    }

    async fn save_download_tick(&self, job_id: &str, percent: u8, last: &mut u8) {
        if percent == *last {
            return;
        }
        *last = percent;
        if let Err(e) = self
            .media
            .save_status(job_id, &JobStatus::downloading(percent))
            .await
        {
            warn!(job_id, error = %e, "Failed to persist download progress");
        }
    }

    async fn mark_complete(&self, job_id: &str, entry: &mut FormatEntry, processed: ProcessedFormat) {
        entry.status = FormatStatus::Complete;
        entry.progress = 100;
        entry.retry_count = processed.attempts.saturating_sub(1);
        entry.width = processed.media.map(|m| m.width);
        entry.height = processed.media.map(|m| m.height);

        match self.storage.metadata(&processed.object.id).await {
            Ok(meta) => {
                entry.size = meta.size;
                entry.width = meta.width.or(entry.width);
                entry.height = meta.height.or(entry.height);
            }
            Err(e) => {
                warn!(job_id, format = %entry.format, error = %e, "Could not fetch output metadata");
            }
        }
        if let (Some(w), Some(h)) = (entry.width, entry.height) {
            entry.resolution = format!("{}x{}", w, h);
        }
        entry.file_id = Some(processed.object.id);
    }

    async fn persist(&self, job_id: &str, entry: &FormatEntry) -> ConversionResult<Vec<FormatEntry>> {
        self.media.save_entry(job_id, entry).await
    }

    async fn persist_progress(&self, job_id: &str, entry: &FormatEntry) -> Option<Vec<FormatEntry>> {
        match self.persist(job_id, entry).await {
            Ok(written) => Some(written),
            Err(e) => {
                warn!(job_id, error = %e, "Failed to persist progress");
                None
            }
        }
    }
}

/// First entry, in stored order, whose format this run has not handled yet.
fn next_unvisited(formats: &[FormatEntry], visited: &mut HashSet<String>) -> Option<FormatEntry> {
    let entry = formats.iter().find(|f| !visited.contains(&f.format))?.clone();
    visited.insert(entry.format.clone());
    Some(entry)
}
