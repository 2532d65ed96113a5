use crate::common::response::{ApiError, ApiResponse, ApiSuccess, CodedApiError};
use crate::modules::conversion::dto::*;
use crate::modules::conversion::model::MediaDocument;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use validator::Validate;

/// Header carrying the storage event name, e.g. `buckets.videos.files.create`.
pub const STORAGE_EVENT_HEADER: &str = "x-storage-event";

/// Queue a conversion for an upload
#[utoipa::path(
    post,
    path = "/api/v1/conversions",
    request_body = SubmitConversionRequest,
    responses(
        (status = 200, description = "Job queued", body = ApiResponse<SubmitConversionResponse>),
        (status = 400, description = "Bad Request"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Conversions"
)]
pub async fn submit_conversion(
    State(state): State<AppState>,
    Json(payload): Json<SubmitConversionRequest>,
) -> impl IntoResponse {
    if let Err(e) = payload.validate() {
        return ApiError(e.to_string(), StatusCode::BAD_REQUEST).into_response();
    }

    match state.conversions.submit(payload).await {
        Ok(res) => ApiSuccess(
            ApiResponse::success(res, "Conversion job queued"),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => CodedApiError::from(e).into_response(),
    }
}

/// Delete some or all formats of an upload
#[utoipa::path(
    delete,
    path = "/api/v1/conversions",
    request_body = DeleteConversionRequest,
    responses(
        (status = 200, description = "Formats removed", body = ApiResponse<DeleteConversionResponse>),
        (status = 400, description = "Bad Request"),
        (status = 404, description = "Document not found")
    ),
    tag = "Conversions"
)]
pub async fn delete_conversion(
    State(state): State<AppState>,
    Json(payload): Json<DeleteConversionRequest>,
) -> impl IntoResponse {
    if let Err(e) = payload.validate() {
        return ApiError(e.to_string(), StatusCode::BAD_REQUEST).into_response();
    }

    match state.conversions.remove(payload).await {
        Ok(res) => ApiSuccess(
            ApiResponse::success(res, "Conversion deleted successfully"),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => CodedApiError::from(e).into_response(),
    }
}

/// Current state of a conversion job
#[utoipa::path(
    get,
    path = "/api/v1/conversions/{id}",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job details", body = ApiResponse<MediaDocument>),
        (status = 404, description = "Job not found")
    ),
    tag = "Conversions"
)]
pub async fn get_conversion(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.conversions.get(&id).await {
        Ok(doc) => ApiSuccess(
            ApiResponse::success(doc, "Conversion retrieved successfully"),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => CodedApiError::from(e).into_response(),
    }
}

/// Storage notification hook
#[utoipa::path(
    post,
    path = "/api/v1/events",
    request_body = StorageEventPayload,
    params(
        ("x-storage-event" = String, Header, description = "Event name")
    ),
    responses(
        (status = 200, description = "Event handled", body = ApiResponse<StorageEventResponse>),
        (status = 400, description = "Unsupported event")
    ),
    tag = "Conversions"
)]
pub async fn storage_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<StorageEventPayload>,
) -> impl IntoResponse {
    let Some(event) = headers
        .get(STORAGE_EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        return ApiError("Missing event header".to_string(), StatusCode::BAD_REQUEST).into_response();
    };

    match state.conversions.handle_event(event, payload).await {
        Ok(res) => ApiSuccess(ApiResponse::success(res, "Event handled"), StatusCode::OK)
            .into_response(),
        Err(e) => CodedApiError::from(e).into_response(),
    }
}
