use utoipa::OpenApi;
use crate::modules::conversion::dto::*;
use crate::modules::conversion::model::{
    ErrorRecord, FormatEntry, FormatStatus, JobState, JobStatus, MediaDocument,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::conversion::handler::submit_conversion,
        crate::modules::conversion::handler::delete_conversion,
        crate::modules::conversion::handler::get_conversion,
        crate::modules::conversion::handler::storage_event,
    ),
    components(
        schemas(
            SubmitConversionRequest, SubmitConversionResponse,
            DeleteConversionRequest, DeleteConversionResponse,
            StorageEventPayload, StorageEventResponse,
            MediaDocument, FormatEntry, FormatStatus, ErrorRecord, JobStatus, JobState,
        )
    ),
    tags(
        (name = "Conversions", description = "Video conversion jobs")
    )
)]
pub struct ApiDoc;
