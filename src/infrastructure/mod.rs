pub mod db;
pub mod ffmpeg;
pub mod queue;
pub mod redis;
pub mod storage;
