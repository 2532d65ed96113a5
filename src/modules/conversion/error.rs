use thiserror::Error;

use crate::infrastructure::db::documents::DocumentError;
use crate::infrastructure::ffmpeg::TranscodeError;
use crate::infrastructure::storage::StorageError;

pub type ConversionResult<T> = Result<T, ConversionError>;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Corrupt document {id}: {message}")]
    CorruptDocument { id: String, message: String },

    #[error("Document store error: {0}")]
    Document(#[from] DocumentError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Transcode(#[from] TranscodeError),

    #[error("Output file is empty")]
    EmptyOutput,

    #[error("[FATAL] Failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ConversionError>,
    },

    #[error("Failed to dispatch job: {0}")]
    Dispatch(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConversionError {
    /// Stable code recorded in a format's error history.
    pub fn code(&self) -> &'static str {
        match self {
            ConversionError::NotFound(_) => "NOT_FOUND",
            ConversionError::Config(_) => "CONFIG_INVALID",
            ConversionError::InvalidRequest(_) => "INVALID_REQUEST",
            ConversionError::CorruptDocument { .. } => "CORRUPT_DOCUMENT",
            ConversionError::Document(_) => "DOCUMENT_STORE_ERROR",
            ConversionError::Storage(StorageError::UploadFailed(_)) => "UPLOAD_FAILED",
            ConversionError::Storage(_) => "STORAGE_ERROR",
            ConversionError::Transcode(e) => e.code(),
            ConversionError::EmptyOutput => "EMPTY_OUTPUT",
            ConversionError::RetriesExhausted { last, .. } => last.code(),
            ConversionError::Dispatch(_) => "DISPATCH_FAILED",
            ConversionError::Serialization(_) | ConversionError::Io(_) => "CONVERSION_ERROR",
        }
    }

    /// Number of transcoding attempts behind this error, when known.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            ConversionError::RetriesExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}
