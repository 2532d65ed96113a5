//! Bounded retries around a single scale operation with atomic output commit.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{error, info, warn};

use super::error::{ConversionError, ConversionResult};
use crate::common::fs::discard;
use crate::common::progress::ProgressReporter;
use crate::config::settings::VideoConfig;
use crate::infrastructure::ffmpeg::Transcoder;

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome {
    pub output: PathBuf,
    pub attempts: u32,
}

pub struct RetryEngine {
    transcoder: Arc<dyn Transcoder>,
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryEngine {
    pub fn new(transcoder: Arc<dyn Transcoder>, config: &VideoConfig) -> Self {
        Self::with_policy(transcoder, config.max_retries, config.retry_delay)
    }

    pub fn with_policy(transcoder: Arc<dyn Transcoder>, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            transcoder,
            max_retries: max_retries.max(1),
            retry_delay,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Scales `input` into `output`, retrying up to `max_retries` times.
    ///
    /// Every attempt writes to a temp file next to `output` which is only
    /// renamed into place once it is known to be non-empty, so `output` either
    /// holds a finished file or does not exist. Failed attempts wait
    /// `retry_delay * attempt` before the next one.
    pub async fn attempt_with_retry(
        &self,
        input: &Path,
        output: &Path,
        target_width: u32,
        progress: ProgressReporter,
    ) -> ConversionResult<RetryOutcome> {
        let temp = temp_path_for(output);
        let mut attempt = 0;

        loop {
            attempt += 1;
            info!(
                attempt,
                max_retries = self.max_retries,
                temp = %temp.display(),
                "[ATTEMPT] {}/{}",
                attempt,
                self.max_retries
            );

            match self.attempt_once(input, &temp, output, target_width, &progress).await {
                Ok(()) => {
                    progress.report(100);
                    return Ok(RetryOutcome {
                        output: output.to_path_buf(),
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "[RETRY] Attempt {} failed", attempt);
                    discard(&temp).await;
                    discard(output).await;

                    if attempt >= self.max_retries {
                        error!(attempts = attempt, "Max retries reached");
                        return Err(ConversionError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }

                    let delay = self.retry_delay * attempt;
                    info!(delay_ms = delay.as_millis() as u64, "Waiting before retry");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt_once(
        &self,
        input: &Path,
        temp: &Path,
        output: &Path,
        target_width: u32,
        progress: &ProgressReporter,
    ) -> ConversionResult<()> {
        self.transcoder
            .scale(input, temp, target_width, progress.clone())
            .await?;

        let size = tokio::fs::metadata(temp).await?.len();
        if size == 0 {
            return Err(ConversionError::EmptyOutput);
        }

        tokio::fs::rename(temp, output).await?;
        info!(output = %output.display(), bytes = size, "Committed output");
        Ok(())
    }
}

/// `<output>.<pid>.<millis>.<seq>.tmp`
pub fn temp_path_for(output: &Path) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let sequence = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);

    let mut name = output.as_os_str().to_os_string();
    name.push(format!(".{}.{}.{}.tmp", std::process::id(), millis, sequence));
    PathBuf::from(name)
}
