use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::dto::{
    DeleteConversionRequest, DeleteConversionResponse, StorageEventPayload, StorageEventResponse,
    SubmitConversionRequest, SubmitConversionResponse,
};
use super::error::{ConversionError, ConversionResult};
use super::events::ConversionJob;
use super::model::{FormatEntry, FormatStatus, JobStatus, MediaDocument};
use super::repository::{MediaRepository, NewMediaDocument};
use crate::infrastructure::queue::JobDispatcher;
use crate::infrastructure::storage::{Bucket, ObjectStore};

/// Request-side operations: queueing, removing and inspecting jobs.
pub struct ConversionService {
    media: MediaRepository,
    objects: Arc<dyn ObjectStore>,
    dispatcher: Arc<dyn JobDispatcher>,
    max_retries: u32,
}

impl ConversionService {
    pub fn new(
        media: MediaRepository,
        objects: Arc<dyn ObjectStore>,
        dispatcher: Arc<dyn JobDispatcher>,
        max_retries: u32,
    ) -> Self {
        Self {
            media,
            objects,
            dispatcher,
            max_retries,
        }
    }

    /// Creates a job for a new upload, or extends the existing job for it
    /// with any formats it does not have yet. Either way the job is queued.
    pub async fn submit(&self, req: SubmitConversionRequest) -> ConversionResult<SubmitConversionResponse> {
        let requested = unique(&req.formats);

        let document = match self.media.find_by_file_id(&req.file_id).await? {
            Some(mut existing) => {
                let mut formats = deduplicate(existing.formats);
                for format in requested {
                    if !formats.iter().any(|f| f.format == format) {
                        info!(job_id = %existing.id, format = %format, "Adding format");
                        formats.push(FormatEntry::queued(format, self.max_retries));
                    }
                }
                self.media.save_formats(&existing.id, &formats).await?;
                existing.formats = formats;
                existing
            }
            None => {
                let id = Uuid::new_v4().to_string();
                let new = NewMediaDocument {
                    file_id: req.file_id.clone(),
                    name: req.name.unwrap_or_default(),
                    file_name: req.file_name.unwrap_or_default(),
                    mime_type: req.mime_type.unwrap_or_default(),
                    size: req.size.unwrap_or_default(),
                    owner_id: req.owner_id.unwrap_or_default(),
                    formats: requested
                        .into_iter()
                        .map(|f| FormatEntry::queued(f, self.max_retries))
                        .collect(),
                    meta_data: Some(JobStatus::queued()),
                };
                let created = self.media.create(&id, &new).await?;
                info!(job_id = %id, file_id = %req.file_id, "Created conversion job");
                created
            }
        };

        self.dispatch(&document.id).await?;
        Ok(SubmitConversionResponse {
            job_id: document.id.clone(),
            document,
        })
    }

    /// Removes the named formats of a job, or the whole job and every object
    /// it owns when no formats are named. Object deletion is best effort.
    pub async fn remove(&self, req: DeleteConversionRequest) -> ConversionResult<DeleteConversionResponse> {
        let doc = self
            .media
            .find_by_file_id(&req.file_id)
            .await?
            .ok_or_else(|| ConversionError::NotFound(req.file_id.clone()))?;

        match req.formats.filter(|f| !f.is_empty()) {
            Some(targets) => {
                let (removed, remaining): (Vec<_>, Vec<_>) = doc
                    .formats
                    .into_iter()
                    .partition(|f| targets.contains(&f.format));
                for entry in &removed {
                    self.delete_object(Bucket::Converted, entry.file_id.as_deref()).await;
                }
                self.media
                    .save_progress(&doc.id, &remaining, &JobStatus::deleted())
                    .await?;
                info!(job_id = %doc.id, removed = removed.len(), "Removed formats");
                Ok(DeleteConversionResponse {
                    job_id: doc.id,
                    removed_formats: Some(targets),
                    deleted: false,
                })
            }
            None => {
                self.delete_object(Bucket::Source, Some(&doc.file_id)).await;
                for entry in &doc.formats {
                    self.delete_object(Bucket::Converted, entry.file_id.as_deref()).await;
                }
                self.media.delete(&doc.id).await?;
                info!(job_id = %doc.id, "🗑️ Deleted conversion job");
                Ok(DeleteConversionResponse {
                    job_id: doc.id,
                    removed_formats: None,
                    deleted: true,
                })
            }
        }
    }

    pub async fn get(&self, id: &str) -> ConversionResult<MediaDocument> {
        self.media.get(id).await
    }

    /// Reacts to a storage notification such as `buckets.files.create`.
    pub async fn handle_event(
        &self,
        event: &str,
        payload: StorageEventPayload,
    ) -> ConversionResult<StorageEventResponse> {
        if event.contains(".create") {
            let id = payload
                .job_id
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let new = NewMediaDocument {
                file_id: payload.file_id.unwrap_or_default(),
                file_name: payload.file_name.unwrap_or_default(),
                meta_data: payload
                    .meta_data
                    .and_then(|value| serde_json::from_value(value).ok()),
                ..NewMediaDocument::default()
            };
            self.media.create(&id, &new).await?;
            info!(job_id = %id, event, "Created job from storage event");
            return Ok(StorageEventResponse {
                job_id: id,
                action: "created".to_string(),
            });
        }

        if event.contains(".delete") {
            let id = payload
                .id
                .or(payload.job_id)
                .ok_or_else(|| ConversionError::InvalidRequest("id is required".to_string()))?;
            self.media.delete(&id).await?;
            info!(job_id = %id, event, "Deleted job from storage event");
            return Ok(StorageEventResponse {
                job_id: id,
                action: "deleted".to_string(),
            });
        }

        Err(ConversionError::InvalidRequest(format!("Unsupported event: {}", event)))
    }

    async fn dispatch(&self, job_id: &str) -> ConversionResult<()> {
        let job = ConversionJob {
            job_id: job_id.to_string(),
        };
        self.dispatcher
            .dispatch(&job)
            .await
            .map_err(|e| ConversionError::Dispatch(e.to_string()))
    }

    async fn delete_object(&self, bucket: Bucket, id: Option<&str>) {
        let Some(id) = id.filter(|id| !id.is_empty()) else {
            return;
        };
        if let Err(e) = self.objects.delete(bucket, id).await {
            warn!(?bucket, object_id = id, error = %e, "Failed to delete object");
        }
    }
}

/// Requested names in order, first occurrence wins.
fn unique(formats: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(formats.len());
    for format in formats {
        let format = format.trim();
        if !format.is_empty() && !seen.iter().any(|s: &String| s == format) {
            seen.push(format.to_string());
        }
    }
    seen
}

/// One entry per format name, keeping the first position. A complete entry
/// replaces an unfinished one with the same name.
fn deduplicate(formats: Vec<FormatEntry>) -> Vec<FormatEntry> {
    let mut unique: Vec<FormatEntry> = Vec::with_capacity(formats.len());
    for entry in formats {
        match unique.iter_mut().find(|f| f.format == entry.format) {
            Some(kept) => {
                if kept.status != FormatStatus::Complete && entry.status == FormatStatus::Complete {
                    *kept = entry;
                }
            }
            None => unique.push(entry),
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::conversion::model::JobState;
    use crate::modules::conversion::repository::encode_formats;
    use crate::testing::{MemoryDocumentStore, MemoryObjectStore, RecordingDispatcher};
    use serde_json::json;

    struct Fixture {
        docs: Arc<MemoryDocumentStore>,
        objects: Arc<MemoryObjectStore>,
        dispatcher: Arc<RecordingDispatcher>,
        service: ConversionService,
    }

    fn fixture() -> Fixture {
        let docs = Arc::new(MemoryDocumentStore::default());
        let objects = Arc::new(MemoryObjectStore::default());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let service = ConversionService::new(
            MediaRepository::new(docs.clone()),
            objects.clone(),
            dispatcher.clone(),
            3,
        );
        Fixture {
            docs,
            objects,
            dispatcher,
            service,
        }
    }

    fn submit(file_id: &str, formats: &[&str]) -> SubmitConversionRequest {
        SubmitConversionRequest {
            file_id: file_id.to_string(),
            formats: formats.iter().map(|f| f.to_string()).collect(),
            name: None,
            file_name: Some("clip.mp4".to_string()),
            mime_type: Some("video/mp4".to_string()),
            size: Some(1024),
            owner_id: None,
        }
    }

    fn complete(format: &str, file_id: &str) -> FormatEntry {
        FormatEntry {
            status: FormatStatus::Complete,
            progress: 100,
            file_id: Some(file_id.to_string()),
            ..FormatEntry::queued(format, 3)
        }
    }

    #[tokio::test]
    async fn new_upload_creates_queued_job_and_dispatches() {
        let f = fixture();
        let res = f.service.submit(submit("file-1", &["720p", "480p", "720p"])).await.unwrap();

        let names: Vec<_> = res.document.formats.iter().map(|e| e.format.as_str()).collect();
        assert_eq!(names, vec!["720p", "480p"]);
        assert!(res.document.formats.iter().all(|e| e.status == FormatStatus::Queued));
        assert_eq!(res.document.meta_data.as_ref().unwrap().status, JobState::Queued);
        assert_eq!(res.document.file_name, "clip.mp4");

        let raw = f.docs.raw(&res.job_id).unwrap();
        assert!(raw["formats"][0].is_string());
        assert_eq!(raw["mimeType"], "video/mp4");
        assert_eq!(f.dispatcher.jobs(), vec![ConversionJob { job_id: res.job_id }]);
    }

    #[tokio::test]
    async fn existing_upload_is_extended_not_duplicated() {
        let f = fixture();
        let stale = FormatEntry {
            status: FormatStatus::Failed,
            ..FormatEntry::queued("720p", 3)
        };
        f.docs.insert_raw(
            "job-1",
            json!({
                "fileId": "file-1",
                "formats": encode_formats(&[stale, complete("720p", "out-720")]).unwrap(),
            }),
        );

        let res = f.service.submit(submit("file-1", &["720p", "1080p"])).await.unwrap();

        assert_eq!(res.job_id, "job-1");
        let formats = &res.document.formats;
        assert_eq!(formats.len(), 2);
        assert_eq!(formats[0].format, "720p");
        assert_eq!(formats[0].status, FormatStatus::Complete);
        assert_eq!(formats[0].file_id.as_deref(), Some("out-720"));
        assert_eq!(formats[1].format, "1080p");
        assert_eq!(formats[1].status, FormatStatus::Queued);

        let stored = f.service.get("job-1").await.unwrap();
        assert_eq!(&stored.formats, formats);
        assert_eq!(f.dispatcher.jobs().len(), 1);
    }

    #[tokio::test]
    async fn removing_formats_keeps_the_rest() {
        let f = fixture();
        f.docs.insert_raw(
            "job-1",
            json!({
                "fileId": "file-1",
                "formats": encode_formats(&[
                    complete("720p", "out-720"),
                    complete("480p", "out-480"),
                ]).unwrap(),
            }),
        );

        let res = f
            .service
            .remove(DeleteConversionRequest {
                file_id: "file-1".to_string(),
                formats: Some(vec!["720p".to_string()]),
            })
            .await
            .unwrap();

        assert!(!res.deleted);
        assert_eq!(f.objects.deleted(), vec![(Bucket::Converted, "out-720".to_string())]);
        let doc = f.service.get("job-1").await.unwrap();
        assert_eq!(doc.formats.len(), 1);
        assert_eq!(doc.formats[0].format, "480p");
        assert_eq!(doc.meta_data.unwrap().status, JobState::Deleted);
    }

    #[tokio::test]
    async fn removing_everything_deletes_objects_and_document() {
        let f = fixture();
        f.docs.insert_raw(
            "job-1",
            json!({
                "fileId": "file-1",
                "formats": encode_formats(&[
                    complete("720p", "out-720"),
                    FormatEntry::queued("480p", 3),
                ]).unwrap(),
            }),
        );

        let res = f
            .service
            .remove(DeleteConversionRequest {
                file_id: "file-1".to_string(),
                formats: None,
            })
            .await
            .unwrap();

        assert!(res.deleted);
        assert_eq!(
            f.objects.deleted(),
            vec![
                (Bucket::Source, "file-1".to_string()),
                (Bucket::Converted, "out-720".to_string()),
            ]
        );
        assert!(!f.docs.contains("job-1"));
    }

    #[tokio::test]
    async fn removing_unknown_upload_is_not_found() {
        let f = fixture();
        let err = f
            .service
            .remove(DeleteConversionRequest {
                file_id: "missing".to_string(),
                formats: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::NotFound(_)));
    }

    #[tokio::test]
    async fn storage_events_create_and_delete_jobs() {
        let f = fixture();
        let created = f
            .service
            .handle_event(
                "buckets.videos.files.create",
                StorageEventPayload {
                    job_id: Some("job-9".to_string()),
                    file_id: Some("file-9".to_string()),
                    file_name: Some("raw.mov".to_string()),
                    ..StorageEventPayload::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(created.action, "created");
        let doc = f.service.get("job-9").await.unwrap();
        assert!(doc.formats.is_empty());
        assert_eq!(doc.file_id, "file-9");
        assert!(f.dispatcher.jobs().is_empty());

        let deleted = f
            .service
            .handle_event(
                "buckets.videos.files.delete",
                StorageEventPayload {
                    id: Some("job-9".to_string()),
                    ..StorageEventPayload::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(deleted.action, "deleted");
        assert!(!f.docs.contains("job-9"));
    }

    #[tokio::test]
    async fn unsupported_event_is_rejected() {
        let f = fixture();
        let err = f
            .service
            .handle_event("buckets.videos.files.update", StorageEventPayload::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[test]
    fn deduplicate_prefers_complete_entries() {
        let formats = vec![
            FormatEntry::queued("720p", 3),
            FormatEntry::queued("480p", 3),
            complete("720p", "a"),
            complete("720p", "b"),
        ];
        let unique = deduplicate(formats);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].file_id.as_deref(), Some("a"));
    }
}
