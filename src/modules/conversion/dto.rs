use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::Validate;

use super::model::MediaDocument;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitConversionRequest {
    #[validate(length(min = 1, message = "fileId is required"))]
    pub file_id: String,
    pub formats: Vec<String>,
    pub name: Option<String>,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<u64>,
    pub owner_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitConversionResponse {
    pub job_id: String,
    pub document: MediaDocument,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteConversionRequest {
    #[validate(length(min = 1, message = "fileId is required"))]
    pub file_id: String,
    /// Only these formats; omit or leave empty to delete everything.
    pub formats: Option<Vec<String>>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteConversionResponse {
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_formats: Option<Vec<String>>,
    pub deleted: bool,
}

/// Body of a storage notification. Which fields matter depends on the event.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageEventPayload {
    pub id: Option<String>,
    pub job_id: Option<String>,
    pub file_id: Option<String>,
    pub file_name: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub meta_data: Option<Value>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageEventResponse {
    pub job_id: String,
    pub action: String,
}
