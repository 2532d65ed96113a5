use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FormatStatus {
    Queued,
    Processing,
    Complete,
    Skipped,
    Failed,
}

impl FormatStatus {
    /// Complete or skipped: nothing left to do for this format.
    pub fn is_settled(self) -> bool {
        matches!(self, FormatStatus::Complete | FormatStatus::Skipped)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub timestamp: Option<OffsetDateTime>,
    pub message: String,
    pub code: String,
}

impl ErrorRecord {
    pub fn now(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            timestamp: Some(OffsetDateTime::now_utc()),
            message: message.into(),
            code: code.into(),
        }
    }
}

pub const UPSCALE_NOT_ALLOWED: &str = "UPSCALE_NOT_ALLOWED";

/// Per-format state tracked inside a job document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormatEntry {
    pub format: String,
    #[serde(default)]
    pub resolution: String,
    pub status: FormatStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_width: Option<u32>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub errors: Vec<ErrorRecord>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub conversion_start: Option<OffsetDateTime>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub conversion_end: Option<OffsetDateTime>,
}

impl FormatEntry {
    pub fn queued(format: impl Into<String>, max_retries: u32) -> Self {
        Self {
            format: format.into(),
            resolution: String::new(),
            status: FormatStatus::Queued,
            progress: 0,
            file_id: None,
            size: None,
            width: None,
            height: None,
            target_width: None,
            retry_count: 0,
            max_retries,
            processing_time: None,
            errors: Vec::new(),
            conversion_start: None,
            conversion_end: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Preparing,
    Processing,
    Complete,
    Deleted,
}

/// Whole-job summary; every write replaces the previous snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub status: JobState,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub step: String,
    #[serde(default)]
    pub message: String,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub job_last_updated: Option<OffsetDateTime>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub job_end_timestamp: Option<OffsetDateTime>,
}

impl JobStatus {
    pub fn new(status: JobState, progress: u8, step: &str, message: &str) -> Self {
        Self {
            status,
            progress,
            step: step.to_string(),
            message: message.to_string(),
            job_last_updated: Some(OffsetDateTime::now_utc()),
            job_end_timestamp: None,
        }
    }

    pub fn queued() -> Self {
        Self::new(JobState::Queued, 0, "Awaiting processing", "Conversion job added to queue")
    }

    pub fn downloading(progress: u8) -> Self {
        let message = if progress == 0 {
            "Conversion job added to queue".to_string()
        } else {
            format!("{}% downloaded", progress)
        };
        Self::new(JobState::Preparing, progress, "Downloading original file", &message)
    }

    pub fn deleted() -> Self {
        Self::new(JobState::Deleted, 0, "Formats removed", "")
    }
}

/// A conversion job as read from the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MediaDocument {
    pub id: String,
    pub file_id: String,
    pub name: String,
    pub file_name: String,
    pub formats: Vec<FormatEntry>,
    pub meta_data: Option<JobStatus>,
}

impl MediaDocument {
    /// Name shown to users: the stored name, else the upload's filename, else
    /// a synthetic one.
    pub fn display_name(&self) -> String {
        if !self.name.trim().is_empty() {
            self.name.clone()
        } else if !self.file_name.trim().is_empty() {
            self.file_name.clone()
        } else {
            format!("File {}", self.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_uses_camel_case_and_lowercase_status() {
        let entry = FormatEntry::queued("720p", 3);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "queued");
        assert_eq!(json["maxRetries"], 3);
        assert_eq!(json["retryCount"], 0);
        assert!(json["fileId"].is_null());
    }

    #[test]
    fn sparse_entry_deserializes_with_defaults() {
        let entry: FormatEntry =
            serde_json::from_str(r#"{"format":"480p","status":"failed"}"#).unwrap();
        assert_eq!(entry.progress, 0);
        assert!(entry.errors.is_empty());
        assert_eq!(entry.status, FormatStatus::Failed);
    }

    #[test]
    fn error_record_keeps_its_timestamp() {
        let record = ErrorRecord::now("boom", "CONVERSION_ERROR");
        let json = serde_json::to_string(&record).unwrap();
        let back: ErrorRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, "CONVERSION_ERROR");
        assert!(back.timestamp.is_some());
    }

    #[test]
    fn display_name_fallbacks() {
        let mut doc = MediaDocument {
            id: "job-1".to_string(),
            file_id: "f1".to_string(),
            name: String::new(),
            file_name: "holiday.mov".to_string(),
            formats: vec![],
            meta_data: None,
        };
        assert_eq!(doc.display_name(), "holiday.mov");
        doc.file_name = "  ".to_string();
        assert_eq!(doc.display_name(), "File job-1");
    }
}
