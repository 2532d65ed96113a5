use std::path::PathBuf;
use thiserror::Error;

pub type TranscodeResult<T> = Result<T, TranscodeError>;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("FFmpeg exited with code {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("FFprobe failed: {0}")]
    Probe(String),

    #[error("Process stalled: no progress for {0} seconds")]
    Stalled(u64),

    #[error("Input file not readable: {0}")]
    InputUnreadable(PathBuf),

    #[error("No video stream found in {0}")]
    NoVideoStream(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TranscodeError {
    pub fn code(&self) -> &'static str {
        match self {
            TranscodeError::Stalled(_) => "TRANSCODE_TIMEOUT",
            TranscodeError::Probe(_) | TranscodeError::NoVideoStream(_) | TranscodeError::Json(_) => {
                "PROBE_FAILED"
            }
            TranscodeError::InputUnreadable(_) => "INPUT_UNREADABLE",
            _ => "TRANSCODE_FAILED",
        }
    }
}
