use axum::extract::multipart::MultipartError;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{BytesRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use moneymate::{CallbackError, SlipError, UploadError};

/// Every client-facing failure; the body is always `{ "error": message }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            ApiError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<SlipError> for ApiError {
    fn from(e: SlipError) -> Self {
        match e {
            SlipError::NotFound => ApiError::NotFound(e.to_string()),
            SlipError::Forbidden => ApiError::Forbidden(e.to_string()),
            SlipError::NotCompleted { .. } | SlipError::NotRequeueable { .. } => {
                ApiError::BadRequest(e.to_string())
            }
            SlipError::Upload(upload) => upload.into(),
            SlipError::Database(_) | SlipError::Dispatch(_) | SlipError::Storage(_) => {
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<CallbackError> for ApiError {
    fn from(e: CallbackError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

/// Extractor rejections keep their status class but get the JSON body.
fn rejection(status: StatusCode, message: String) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(message)
    } else if status.is_server_error() {
        ApiError::Internal(message)
    } else {
        ApiError::BadRequest(message)
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(r: MultipartRejection) -> Self {
        rejection(r.status(), r.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(r: PathRejection) -> Self {
        rejection(r.status(), r.body_text())
    }
}

impl From<BytesRejection> for ApiError {
    fn from(r: BytesRejection) -> Self {
        rejection(r.status(), r.body_text())
    }
}

/// Multipart failures are client errors; an over-limit body reports the
/// upload size limit.
pub fn multipart_error(e: MultipartError, max_bytes: usize) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return UploadError::TooLarge {
            size: max_bytes.saturating_add(1),
            limit_mb: max_bytes.div_ceil(1024 * 1024),
        }
        .into();
    }
    ApiError::BadRequest(format!("Upload error: {}", e.body_text()))
}
