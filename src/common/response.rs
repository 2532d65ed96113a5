use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::modules::conversion::error::ConversionError;

#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn success(data: T, message: &str) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            code: None,
            data: Some(data),
        }
    }

    pub fn error(message: &str, code: Option<&str>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.to_string(),
            code: code.map(str::to_string),
            data: None,
        }
    }
}

pub struct ApiSuccess<T>(pub T, pub StatusCode);

impl<T> IntoResponse for ApiSuccess<ApiResponse<T>>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        let (response, status) = (self.0, self.1);
        (status, Json(response)).into_response()
    }
}

pub struct ApiError(pub String, pub StatusCode);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (message, status) = (self.0, self.1);
        let response = ApiResponse::<()>::error(&message, None);
        (status, Json(response)).into_response()
    }
}

/// Like [`ApiError`] but carries the error's stable code.
pub struct CodedApiError {
    message: String,
    code: &'static str,
    status: StatusCode,
}

impl From<ConversionError> for CodedApiError {
    fn from(e: ConversionError) -> Self {
        let status = match &e {
            ConversionError::NotFound(_) => StatusCode::NOT_FOUND,
            ConversionError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ConversionError::Document(
                crate::infrastructure::db::documents::DocumentError::AlreadyExists(_),
            ) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            message: e.to_string(),
            code: e.code(),
            status,
        }
    }
}

impl IntoResponse for CodedApiError {
    fn into_response(self) -> Response {
        let response = ApiResponse::<()>::error(&self.message, Some(self.code));
        (self.status, Json(response)).into_response()
    }
}
