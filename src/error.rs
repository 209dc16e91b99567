use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

pub const DUPLICATE_REQUEST_MESSAGE: &str =
    "Duplicate request detected. Please wait before retrying.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed validation: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("{}", DUPLICATE_REQUEST_MESSAGE)]
    DuplicateRequest,
    #[error("content-type must be application/json")]
    UnsupportedMediaType,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::DuplicateRequest => StatusCode::CONFLICT,
            ApiError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        }
    }

    fn message(&self) -> Value {
        match self {
            ApiError::Validation(messages) => json!(messages),
            other => json!(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "statusCode": status.as_u16(),
            "message": self.message(),
            "error": status.canonical_reason().unwrap_or("Error"),
        });
        (status, Json(body)).into_response()
    }
}
