//! FFprobe video information.

use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use utoipa::ToSchema;

use super::error::{TranscodeError, TranscodeResult};

/// Native dimensions and duration of a video file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    /// Seconds; 0 when the container does not report one.
    pub duration: f64,
}

impl MediaInfo {
    pub fn duration_ms(&self) -> u64 {
        if self.duration.is_finite() && self.duration > 0.0 {
            (self.duration * 1000.0).floor() as u64
        } else {
            0
        }
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

pub async fn probe_video(ffprobe: &str, path: &Path) -> TranscodeResult<MediaInfo> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,duration:format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| TranscodeError::Spawn {
            program: ffprobe.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(TranscodeError::Probe(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    parse_probe_output(&output.stdout, path)
}

fn parse_probe_output(stdout: &[u8], path: &Path) -> TranscodeResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;
    let stream = probe
        .streams
        .first()
        .ok_or_else(|| TranscodeError::NoVideoStream(path.to_path_buf()))?;

    let (Some(width), Some(height)) = (stream.width, stream.height) else {
        return Err(TranscodeError::NoVideoStream(path.to_path_buf()));
    };

    // Matroska and friends only carry the duration on the container.
    let duration = stream
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            probe
                .format
                .as_ref()
                .and_then(|f| f.duration.as_deref())
                .and_then(|d| d.parse::<f64>().ok())
        })
        .unwrap_or(0.0);

    Ok(MediaInfo {
        width,
        height,
        duration,
    })
}
