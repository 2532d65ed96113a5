//! Adapter around the external ffmpeg/ffprobe executables.

pub mod command;
pub mod error;
pub mod probe;
pub mod progress;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::common::progress::ProgressReporter;
use crate::config::settings::VideoConfig;

pub use command::{FfmpegCommand, even_width};
pub use error::{TranscodeError, TranscodeResult};
pub use probe::MediaInfo;
use progress::ProgressParser;

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Native width, height and duration of `input`.
    async fn inspect(&self, input: &Path) -> TranscodeResult<MediaInfo>;

    /// Scales `input` to `target_width` (height follows the aspect ratio) and
    /// writes an MP4 to `output`, reporting 0-100 on `progress`.
    async fn scale(
        &self,
        input: &Path,
        output: &Path,
        target_width: u32,
        progress: ProgressReporter,
    ) -> TranscodeResult<()>;
}

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    ffprobe_path: String,
    stall_timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(config: &VideoConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            stall_timeout: config.stall_timeout,
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn inspect(&self, input: &Path) -> TranscodeResult<MediaInfo> {
        let info = probe::probe_video(&self.ffprobe_path, input).await?;
        info!(
            path = %input.display(),
            width = info.width,
            height = info.height,
            duration = info.duration,
            "Probed video"
        );
        Ok(info)
    }

    async fn scale(
        &self,
        input: &Path,
        output: &Path,
        target_width: u32,
        progress: ProgressReporter,
    ) -> TranscodeResult<()> {
        if tokio::fs::metadata(input).await.is_err() {
            return Err(TranscodeError::InputUnreadable(input.to_path_buf()));
        }
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let source = self.inspect(input).await?;
        let parser = ProgressParser::new(source.duration_ms());
        let width = even_width(target_width);
        info!(width, output = %output.display(), "Scaling video");

        let args = FfmpegCommand::scale_to_mp4(input, output, width).build_args();
        command::run_with_watchdog(&self.ffmpeg_path, &args, self.stall_timeout, |line| {
            if let Some(percent) = parser.parse_line(line) {
                progress.report(percent);
            }
        })
        .await?;

        progress.report(100);
        Ok(())
    }
}
