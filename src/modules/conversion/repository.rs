//! Boundary between typed job state and the flat document store.
//!
//! The store keeps `formats` as a list of individually JSON-encoded entries
//! and `metaData` as a JSON string. Reads accept either that form or plain
//! structured values; writes always produce the encoded form.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::warn;

use super::error::{ConversionError, ConversionResult};
use super::model::{FormatEntry, JobStatus, MediaDocument};
use super::progress::aggregate;
use crate::infrastructure::db::documents::{DocumentError, DocumentStore, Fields, StoredDocument};

const FILE_ID: &str = "fileId";
const NAME: &str = "name";
const FILE_NAME: &str = "fileName";
const FORMATS: &str = "formats";
const META_DATA: &str = "metaData";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decode {
    /// Any unreadable entry fails the whole read.
    Strict,
    /// Unreadable entries are logged and dropped.
    Lossy,
}

/// Fields of a job document that does not exist yet.
#[derive(Debug, Clone, Default)]
pub struct NewMediaDocument {
    pub file_id: String,
    pub name: String,
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
    pub owner_id: String,
    pub formats: Vec<FormatEntry>,
    pub meta_data: Option<JobStatus>,
}

#[derive(Clone)]
pub struct MediaRepository {
    store: Arc<dyn DocumentStore>,
}

impl MediaRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Loads a job for processing. Corrupt format entries are an error.
    pub async fn get(&self, id: &str) -> ConversionResult<MediaDocument> {
        let stored = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| ConversionError::NotFound(id.to_string()))?;
        decode_document(&stored, Decode::Strict)
    }

    /// Looks a job up by its source upload. Corrupt format entries are dropped.
    pub async fn find_by_file_id(&self, file_id: &str) -> ConversionResult<Option<MediaDocument>> {
        match self.store.find_by_field(FILE_ID, &json!(file_id)).await? {
            Some(stored) => decode_document(&stored, Decode::Lossy).map(Some),
            None => Ok(None),
        }
    }

    pub async fn create(&self, id: &str, new: &NewMediaDocument) -> ConversionResult<MediaDocument> {
        let mut fields = Fields::new();
        fields.insert(FILE_ID.to_string(), json!(new.file_id));
        fields.insert(NAME.to_string(), json!(new.name));
        fields.insert(FILE_NAME.to_string(), json!(new.file_name));
        fields.insert("mimeType".to_string(), json!(new.mime_type));
        fields.insert("size".to_string(), json!(new.size));
        fields.insert("ownerId".to_string(), json!(new.owner_id));
        fields.insert(FORMATS.to_string(), encode_formats(&new.formats)?);
        if let Some(status) = &new.meta_data {
            fields.insert(META_DATA.to_string(), encode_status(status)?);
        }

        let stored = self.store.create(id, fields).await?;
        decode_document(&stored, Decode::Strict)
    }

    pub async fn set_name(&self, id: &str, name: &str) -> ConversionResult<()> {
        let mut fields = Fields::new();
        fields.insert(NAME.to_string(), json!(name));
        self.update(id, fields).await
    }

    pub async fn save_status(&self, id: &str, status: &JobStatus) -> ConversionResult<()> {
        let mut fields = Fields::new();
        fields.insert(META_DATA.to_string(), encode_status(status)?);
        self.update(id, fields).await
    }

    pub async fn save_formats(&self, id: &str, formats: &[FormatEntry]) -> ConversionResult<()> {
        let mut fields = Fields::new();
        fields.insert(FORMATS.to_string(), encode_formats(formats)?);
        self.update(id, fields).await
    }

    /// Writes the format list together with the job summary derived from it.
    pub async fn save_progress(
        &self,
        id: &str,
        formats: &[FormatEntry],
        status: &JobStatus,
    ) -> ConversionResult<()> {
        let mut fields = Fields::new();
        fields.insert(FORMATS.to_string(), encode_formats(formats)?);
        fields.insert(META_DATA.to_string(), encode_status(status)?);
        self.update(id, fields).await
    }

    /// Replaces the stored entry with the same `format` and refreshes the job
    /// summary. Every other entry is written back as currently stored, so
    /// formats added or removed since the caller last read the document are
    /// left as they are. An entry that is no longer stored is not restored.
    ///
    /// Returns the list as written.
    pub async fn save_entry(&self, id: &str, entry: &FormatEntry) -> ConversionResult<Vec<FormatEntry>> {
        let mut formats = self.get(id).await?.formats;
        match formats.iter_mut().find(|f| f.format == entry.format) {
            Some(stored) => *stored = entry.clone(),
            None => warn!(job_id = %id, format = %entry.format, "Format was removed, not restoring it"),
        }
        self.save_progress(id, &formats, &aggregate(&formats, None)).await?;
        Ok(formats)
    }

    pub async fn delete(&self, id: &str) -> ConversionResult<()> {
        self.store.delete(id).await.map_err(|e| match e {
            DocumentError::NotFound(id) => ConversionError::NotFound(id),
            other => ConversionError::Document(other),
        })
    }

    async fn update(&self, id: &str, fields: Fields) -> ConversionResult<()> {
        self.store.update(id, fields).await.map_err(|e| match e {
            DocumentError::NotFound(id) => ConversionError::NotFound(id),
            other => ConversionError::Document(other),
        })?;
        Ok(())
    }
}

pub fn encode_formats(formats: &[FormatEntry]) -> ConversionResult<Value> {
    let encoded = formats
        .iter()
        .map(|entry| serde_json::to_string(entry).map(Value::String))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(encoded))
}

pub fn encode_status(status: &JobStatus) -> ConversionResult<Value> {
    Ok(Value::String(serde_json::to_string(status)?))
}

fn decode_document(stored: &StoredDocument, mode: Decode) -> ConversionResult<MediaDocument> {
    let text = |key: &str| {
        stored
            .fields
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    Ok(MediaDocument {
        id: stored.id.clone(),
        file_id: text(FILE_ID),
        name: text(NAME),
        file_name: text(FILE_NAME),
        formats: decode_formats(&stored.id, stored.fields.get(FORMATS), mode)?,
        meta_data: stored.fields.get(META_DATA).and_then(decode_status),
    })
}

fn decode_formats(id: &str, value: Option<&Value>, mode: Decode) -> ConversionResult<Vec<FormatEntry>> {
    let corrupt = |message: String| ConversionError::CorruptDocument {
        id: id.to_string(),
        message,
    };

    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items.clone(),
        // The whole list stored as one JSON string.
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(items)) => items,
            Ok(_) | Err(_) if mode == Decode::Lossy => {
                warn!(job_id = %id, "Unreadable formats field, treating as empty");
                return Ok(Vec::new());
            }
            Ok(_) => return Err(corrupt("formats is not a list".to_string())),
            Err(e) => return Err(corrupt(format!("formats: {}", e))),
        },
        Some(_) => return Err(corrupt("formats is not a list".to_string())),
    };

    let mut formats = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let decoded = match item {
            Value::Null => continue,
            Value::String(raw) => serde_json::from_str::<FormatEntry>(&raw),
            other => serde_json::from_value::<FormatEntry>(other),
        };
        match decoded {
            Ok(entry) => formats.push(entry),
            Err(e) if mode == Decode::Lossy => {
                warn!(job_id = %id, index, error = %e, "Dropping unreadable format entry");
            }
            Err(e) => return Err(corrupt(format!("format entry {}: {}", index, e))),
        }
    }
    Ok(formats)
}

fn decode_status(value: &Value) -> Option<JobStatus> {
    match value {
        Value::String(raw) => serde_json::from_str(raw).ok(),
        Value::Object(_) => serde_json::from_value(value.clone()).ok(),
        _ => None,
    }
}
