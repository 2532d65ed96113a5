use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::config::env::{self, EnvKey};
use crate::modules::conversion::error::ConversionError;

/// Target widths for every format name the converter understands.
const FORMAT_WIDTHS: &[(&str, u32)] = &[
    ("8K", 7680),
    ("6K", 6144),
    ("5K", 5120),
    ("4K", 3840),
    ("2K", 2048),
    ("UHD", 3840),
    ("1080p", 1920),
    ("HD", 1280),
    ("720p", 1280),
    ("480p", 854),
    ("360p", 640),
    ("240p", 426),
];

/// Width used for format names missing from the table.
pub const DEFAULT_FORMAT: &str = "HD";

pub fn format_width(format: &str) -> Option<u32> {
    FORMAT_WIDTHS
        .iter()
        .find(|(name, _)| *name == format)
        .map(|(_, width)| *width)
}

/// Resolves a format name to its target width, falling back to HD.
pub fn target_width(format: &str) -> u32 {
    format_width(format)
        .or_else(|| format_width(DEFAULT_FORMAT))
        .unwrap_or(1280)
}

#[derive(Clone, Debug, Deserialize)]
pub struct VideoConfig {
    pub temp_dir: PathBuf,
    pub output_dir: PathBuf,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub stall_timeout: Duration,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// Zero disables per-job leasing.
    pub job_lease_ttl: Duration,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("tmp"),
            output_dir: PathBuf::from("tmp"),
            max_retries: 3,
            retry_delay: Duration::from_millis(5000),
            stall_timeout: Duration::from_secs(300),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            job_lease_ttl: Duration::from_secs(6 * 60 * 60),
        }
    }
}

impl VideoConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            temp_dir: PathBuf::from(env::get_or(EnvKey::TempDir, "tmp")),
            output_dir: PathBuf::from(env::get_or(EnvKey::OutputDir, "tmp")),
            max_retries: env::get_parsed(EnvKey::MaxRetries, defaults.max_retries),
            retry_delay: Duration::from_millis(env::get_parsed(EnvKey::RetryDelayMs, 5000)),
            stall_timeout: Duration::from_secs(env::get_parsed(EnvKey::StallTimeoutSecs, 300)),
            ffmpeg_path: env::get_or(EnvKey::FfmpegPath, &defaults.ffmpeg_path),
            ffprobe_path: env::get_or(EnvKey::FfprobePath, &defaults.ffprobe_path),
            job_lease_ttl: Duration::from_secs(env::get_parsed(
                EnvKey::JobLeaseTtlSecs,
                defaults.job_lease_ttl.as_secs(),
            )),
        }
    }

    pub fn validate(&self) -> Result<(), ConversionError> {
        if self.temp_dir.as_os_str().is_empty() || self.output_dir.as_os_str().is_empty() {
            return Err(ConversionError::Config(
                "TEMP_DIR and OUTPUT_DIR must not be empty".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ConversionError::Config("MAX_RETRIES must be at least 1".to_string()));
        }
        if self.stall_timeout.is_zero() {
            return Err(ConversionError::Config(
                "STALL_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        if self.ffmpeg_path.trim().is_empty() || self.ffprobe_path.trim().is_empty() {
            return Err(ConversionError::Config(
                "FFMPEG_PATH and FFPROBE_PATH must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub rabbitmq_url: String,
    pub minio_url: String,
    pub minio_source_bucket: String,
    pub minio_converted_bucket: String,
    pub minio_access_key: String,
    pub minio_secret_key: String,
    pub video: VideoConfig,
}

impl AppConfig {
    pub fn new() -> Result<Self, std::env::VarError> {
        Ok(Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            database_url: env::get(EnvKey::DatabaseUrl)?,
            redis_url: env::get(EnvKey::RedisUrl)?,
            rabbitmq_url: env::get(EnvKey::RabbitMqUrl)?,
            minio_url: env::get(EnvKey::MinioUrl)?,
            minio_source_bucket: env::get(EnvKey::MinioSourceBucket)?,
            minio_converted_bucket: env::get(EnvKey::MinioConvertedBucket)?,
            minio_access_key: env::get(EnvKey::MinioAccessKey)?,
            minio_secret_key: env::get(EnvKey::MinioSecretKey)?,
            video: VideoConfig::from_env(),
        })
    }

    pub fn validate(&self) -> Result<(), ConversionError> {
        let required = [
            ("DATABASE_URL", &self.database_url),
            ("REDIS_URL", &self.redis_url),
            ("RABBITMQ_URL", &self.rabbitmq_url),
            ("MINIO_ENDPOINT", &self.minio_url),
            ("MINIO_BUCKET_SOURCE", &self.minio_source_bucket),
            ("MINIO_BUCKET_CONVERTED", &self.minio_converted_bucket),
            ("AWS_ACCESS_KEY_ID", &self.minio_access_key),
            ("AWS_SECRET_ACCESS_KEY", &self.minio_secret_key),
        ];
        if let Some((key, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ConversionError::Config(format!("{key} must not be empty")));
        }
        self.video.validate()
    }
}
