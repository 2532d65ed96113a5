//! In-memory collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::common::progress::ProgressReporter;
use crate::infrastructure::db::documents::{
    DocumentError, DocumentResult, DocumentStore, Fields, StoredDocument,
};
use crate::infrastructure::ffmpeg::{MediaInfo, TranscodeError, TranscodeResult, Transcoder};
use crate::infrastructure::queue::JobDispatcher;
use crate::infrastructure::storage::{
    Bucket, ObjectMetadata, ObjectStore, StorageError, StorageResult, StoredObject,
};
use crate::modules::conversion::events::ConversionJob;

/// Sorted file names directly under `dir`.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<HashMap<String, (u64, Fields)>>,
    sequence: AtomicU64,
    fail_updates: AtomicBool,
    updates: Mutex<Vec<(String, Fields)>>,
}

impl MemoryDocumentStore {
    /// Inserts a document exactly as given, bypassing any encoding.
    pub fn insert_raw(&self, id: &str, fields: Value) {
        let fields = fields.as_object().cloned().unwrap_or_default();
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.docs.lock().unwrap().insert(id.to_string(), (seq, fields));
    }

    pub fn raw(&self, id: &str) -> Option<Value> {
        self.docs
            .lock()
            .unwrap()
            .get(id)
            .map(|(_, fields)| Value::Object(fields.clone()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.docs.lock().unwrap().contains_key(id)
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Field sets of every successful `update` on `id`, oldest first.
    pub fn updates(&self, id: &str) -> Vec<Fields> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|(doc, _)| doc == id)
            .map(|(_, fields)| fields.clone())
            .collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, id: &str) -> DocumentResult<Option<StoredDocument>> {
        Ok(self.docs.lock().unwrap().get(id).map(|(_, fields)| StoredDocument {
            id: id.to_string(),
            fields: fields.clone(),
        }))
    }

    async fn create(&self, id: &str, fields: Fields) -> DocumentResult<StoredDocument> {
        let mut docs = self.docs.lock().unwrap();
        if docs.contains_key(id) {
            return Err(DocumentError::AlreadyExists(id.to_string()));
        }
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        docs.insert(id.to_string(), (seq, fields.clone()));
        Ok(StoredDocument {
            id: id.to_string(),
            fields,
        })
    }

    async fn update(&self, id: &str, fields: Fields) -> DocumentResult<StoredDocument> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(DocumentError::Database(sqlx::Error::PoolClosed));
        }
        let mut docs = self.docs.lock().unwrap();
        let (_, stored) = docs
            .get_mut(id)
            .ok_or_else(|| DocumentError::NotFound(id.to_string()))?;
        stored.extend(fields.clone());
        self.updates.lock().unwrap().push((id.to_string(), fields));
        Ok(StoredDocument {
            id: id.to_string(),
            fields: stored.clone(),
        })
    }

    async fn delete(&self, id: &str) -> DocumentResult<()> {
        self.docs
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| DocumentError::NotFound(id.to_string()))
    }

    async fn find_by_field(
        &self,
        name: &str,
        value: &Value,
    ) -> DocumentResult<Option<StoredDocument>> {
        let docs = self.docs.lock().unwrap();
        Ok(docs
            .iter()
            .filter(|(_, (_, fields))| fields.get(name) == Some(value))
            .min_by_key(|(_, (seq, _))| *seq)
            .map(|(id, (_, fields))| StoredDocument {
                id: id.clone(),
                fields: fields.clone(),
            }))
    }
}

#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub id: String,
    pub name: String,
    pub bytes: Vec<u8>,
    pub media: Option<MediaInfo>,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    sources: Mutex<HashMap<String, Vec<u8>>>,
    uploads: Mutex<Vec<UploadRecord>>,
    deleted: Mutex<Vec<(Bucket, String)>>,
    fail_metadata: AtomicBool,
    fail_uploads: AtomicBool,
}

impl MemoryObjectStore {
    pub fn with_source(self, id: &str, bytes: &[u8]) -> Self {
        self.sources.lock().unwrap().insert(id.to_string(), bytes.to_vec());
        self
    }

    pub fn fail_metadata(&self, fail: bool) {
        self.fail_metadata.store(fail, Ordering::SeqCst);
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<(Bucket, String)> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn download(
        &self,
        id: &str,
        dest: &Path,
        progress: ProgressReporter,
    ) -> StorageResult<u64> {
        let bytes = self
            .sources
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        progress.report(50);
        tokio::fs::write(dest, &bytes).await?;
        progress.report(100);
        Ok(bytes.len() as u64)
    }

    async fn upload(
        &self,
        local_path: &Path,
        name: &str,
        media: Option<&MediaInfo>,
    ) -> StorageResult<StoredObject> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::UploadFailed("bucket unavailable".to_string()));
        }
        let bytes = tokio::fs::read(local_path).await?;
        let mut uploads = self.uploads.lock().unwrap();
        let id = format!("converted-{}", uploads.len() + 1);
        uploads.push(UploadRecord {
            id: id.clone(),
            name: name.to_string(),
            bytes,
            media: media.copied(),
        });
        Ok(StoredObject {
            id,
            name: name.to_string(),
        })
    }

    async fn delete(&self, bucket: Bucket, id: &str) -> StorageResult<()> {
        self.deleted.lock().unwrap().push((bucket, id.to_string()));
        Ok(())
    }

    async fn metadata(&self, id: &str) -> StorageResult<ObjectMetadata> {
        if self.fail_metadata.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("metadata unavailable".to_string()));
        }
        let uploads = self.uploads.lock().unwrap();
        let record = uploads
            .iter()
            .find(|u| u.id == id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        Ok(ObjectMetadata {
            size: Some(record.bytes.len() as u64),
            width: record.media.map(|m| m.width),
            height: record.media.map(|m| m.height),
        })
    }
}

#[derive(Debug, Clone)]
pub enum ScaleBehavior {
    /// Writes the bytes and succeeds.
    Write(Vec<u8>),
    /// Creates an empty output and succeeds.
    Empty,
    /// Fails without touching the output.
    Fail,
    /// Writes the bytes, then fails as if the process died.
    PartialThenFail(Vec<u8>),
    Stall,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleCall {
    pub input: PathBuf,
    pub output: PathBuf,
    pub target_width: u32,
}

/// Plays back a queue of behaviours, then repeats a default one.
pub struct ScriptedTranscoder {
    source: MediaInfo,
    script: Mutex<VecDeque<ScaleBehavior>>,
    fallback: ScaleBehavior,
    calls: Mutex<Vec<ScaleCall>>,
}

impl ScriptedTranscoder {
    pub fn new(source_width: u32) -> Self {
        Self {
            source: MediaInfo {
                width: source_width,
                height: source_width * 9 / 16,
                duration: 10.0,
            },
            script: Mutex::new(VecDeque::new()),
            fallback: ScaleBehavior::Write(b"converted".to_vec()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, behavior: ScaleBehavior) -> Self {
        self.script.lock().unwrap().push_back(behavior);
        self
    }

    pub fn always(mut self, behavior: ScaleBehavior) -> Self {
        self.fallback = behavior;
        self
    }

    pub fn calls(&self) -> Vec<ScaleCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn failure() -> TranscodeError {
        TranscodeError::Failed {
            code: Some(1),
            stderr: "scripted failure".to_string(),
        }
    }
}

#[async_trait]
impl Transcoder for ScriptedTranscoder {
    /// The source before any scale call, the last scaled output after.
    async fn inspect(&self, _input: &Path) -> TranscodeResult<MediaInfo> {
        let last = self.calls.lock().unwrap().last().cloned();
        Ok(match last {
            Some(call) => MediaInfo {
                width: call.target_width,
                height: call.target_width * self.source.height / self.source.width.max(1),
                duration: self.source.duration,
            },
            None => self.source,
        })
    }

    async fn scale(
        &self,
        input: &Path,
        output: &Path,
        target_width: u32,
        progress: ProgressReporter,
    ) -> TranscodeResult<()> {
        self.calls.lock().unwrap().push(ScaleCall {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            target_width,
        });
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        progress.report(0);
        match behavior {
            ScaleBehavior::Write(bytes) => {
                tokio::fs::write(output, &bytes).await?;
                progress.report(50);
                progress.report(100);
                Ok(())
            }
            ScaleBehavior::Empty => {
                tokio::fs::write(output, b"").await?;
                progress.report(100);
                Ok(())
            }
            ScaleBehavior::Fail => Err(Self::failure()),
            ScaleBehavior::PartialThenFail(bytes) => {
                tokio::fs::write(output, &bytes).await?;
                progress.report(30);
                Err(Self::failure())
            }
            ScaleBehavior::Stall => Err(TranscodeError::Stalled(300)),
        }
    }
}

#[derive(Default)]
pub struct RecordingDispatcher {
    jobs: Mutex<Vec<ConversionJob>>,
}

impl RecordingDispatcher {
    pub fn jobs(&self) -> Vec<ConversionJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobDispatcher for RecordingDispatcher {
    async fn dispatch(&self, job: &ConversionJob) -> anyhow::Result<()> {
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }
}
