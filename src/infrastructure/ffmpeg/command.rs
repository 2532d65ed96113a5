//! FFmpeg command builder and a process runner guarded by a stall watchdog.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::error::{TranscodeError, TranscodeResult};

const STDERR_TAIL_LINES: usize = 20;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    output_args: Vec<String>,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            log_level: "error".to_string(),
        }
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn pixel_format(self, format: impl Into<String>) -> Self {
        self.output_arg("-pix_fmt").output_arg(format)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn container(self, format: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(format)
    }

    /// H.264 video and AAC audio in an MP4 container, scaled to `width`.
    pub fn scale_to_mp4(input: impl AsRef<Path>, output: impl AsRef<Path>, width: u32) -> Self {
        Self::new(input, output)
            .video_filter(scale_filter(width))
            .video_codec("libx264")
            .pixel_format("yuv420p")
            .audio_codec("aac")
            .output_arg("-strict")
            .output_arg("experimental")
            .container("mp4")
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-y".to_string(),
            "-loglevel".to_string(),
            self.log_level.clone(),
            // Progress key/value lines go to stdout, diagnostics to stderr.
            "-progress".to_string(),
            "pipe:1".to_string(),
            "-i".to_string(),
            self.input.to_string_lossy().to_string(),
        ];
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

/// Largest even width not above `width`, never below 2.
pub fn even_width(width: u32) -> u32 {
    (width - width % 2).max(2)
}

pub fn scale_filter(width: u32) -> String {
    format!("scale={}:-2:force_divisible_by=2", even_width(width))
}

/// Runs `program`, handing every stdout line to `on_line`.
///
/// The process is killed when neither a stdout line nor exit arrives within
/// `stall_timeout` of the previous one.
pub async fn run_with_watchdog<F>(
    program: &str,
    args: &[String],
    stall_timeout: Duration,
    mut on_line: F,
) -> TranscodeResult<()>
where
    F: FnMut(&str),
{
    debug!("Running: {} {}", program, args.join(" "));

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| TranscodeError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let stderr_task = child.stderr.take().map(|stderr| {
        tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        })
    });

    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match tokio::time::timeout(stall_timeout, lines.next_line()).await {
                Ok(Ok(Some(line))) => on_line(&line),
                Ok(Ok(None)) => break,
                Ok(Err(e)) => {
                    kill(&mut child).await;
                    return Err(TranscodeError::Io(e));
                }
                Err(_) => {
                    warn!(
                        "No progress from {} for {}s, killing process",
                        program,
                        stall_timeout.as_secs()
                    );
                    kill(&mut child).await;
                    return Err(TranscodeError::Stalled(stall_timeout.as_secs()));
                }
            }
        }
    }

    let status = match tokio::time::timeout(stall_timeout, child.wait()).await {
        Ok(status) => status?,
        Err(_) => {
            warn!("{} closed its output but did not exit, killing process", program);
            kill(&mut child).await;
            return Err(TranscodeError::Stalled(stall_timeout.as_secs()));
        }
    };

    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    if status.success() {
        Ok(())
    } else {
        Err(TranscodeError::Failed {
            code: status.code(),
            stderr,
        })
    }
}

async fn kill(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill process: {}", e);
    }
}
