use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    DatabaseUrl,
    RedisUrl,
    RabbitMqUrl,
    MinioUrl,
    MinioSourceBucket,
    MinioConvertedBucket,
    MinioAccessKey,
    MinioSecretKey,
    TempDir,
    OutputDir,
    MaxRetries,
    RetryDelayMs,
    StallTimeoutSecs,
    FfmpegPath,
    FfprobePath,
    JobLeaseTtlSecs,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::RedisUrl => "REDIS_URL",
            EnvKey::RabbitMqUrl => "RABBITMQ_URL",
            EnvKey::MinioUrl => "MINIO_ENDPOINT",
            EnvKey::MinioSourceBucket => "MINIO_BUCKET_SOURCE",
            EnvKey::MinioConvertedBucket => "MINIO_BUCKET_CONVERTED",
            EnvKey::MinioAccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::MinioSecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::TempDir => "TEMP_DIR",
            EnvKey::OutputDir => "OUTPUT_DIR",
            EnvKey::MaxRetries => "MAX_RETRIES",
            EnvKey::RetryDelayMs => "RETRY_DELAY_MS",
            EnvKey::StallTimeoutSecs => "STALL_TIMEOUT_SECS",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
            EnvKey::FfprobePath => "FFPROBE_PATH",
            EnvKey::JobLeaseTtlSecs => "JOB_LEASE_TTL_SECS",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
