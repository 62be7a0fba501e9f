//! HTTP handlers for `/api/slips` and `/health`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{BytesRejection, PathRejection};
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde_json::json;

use moneymate::callback::{self, CallbackPayload};
use moneymate::UploadError;

use crate::auth::AuthUser;
use crate::error::{multipart_error, ApiError};
use crate::state::AppState;

/// Multipart field holding the slip image.
pub const UPLOAD_FIELD: &str = "slip";

/// POST /api/slips/upload
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut multipart = multipart?;
    let max_bytes = state.max_upload_bytes();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let original_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, max_bytes))?;

        let uploaded = state
            .service
            .upload(&user.user_id, &original_name, content_type.as_deref(), &bytes)
            .await?;

        return Ok((StatusCode::CREATED, Json(json!({ "data": uploaded.slip }))));
    }

    Err(UploadError::Empty.into())
}

/// GET /api/slips
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let slips = state.service.list(&user.user_id)?;
    Ok(Json(json!({ "data": slips })))
}

/// GET /api/slips/{id}
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    id: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id?;
    let slip = state.service.get_status(&user.user_id, &id)?;
    Ok(Json(json!({ "data": slip })))
}

/// GET /api/slips/{id}/result
pub async fn get_result(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    id: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id?;
    let result = state.service.get_result(&user.user_id, &id)?;
    Ok(Json(json!({ "data": result })))
}

/// POST /api/slips/{id}/requeue
pub async fn requeue(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    id: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id?;
    let slip = state.service.requeue(&user.user_id, &id).await?;
    Ok(Json(json!({ "data": slip })))
}

/// POST /api/slips/callback
///
/// Called by the OCR worker, not by users. Once the request is
/// authenticated and well formed the answer is always 200; reconciliation
/// problems are only logged.
pub async fn ocr_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(secret) = &state.callback_secret {
        secret.check(&headers)?;
    }
    let body = body?;

    let payload: CallbackPayload = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("Invalid callback body".into()))?;
    let report = payload.validate()?;

    if let Err(e) = callback::reconcile(&state.service, &report).await {
        log::error!(
            "Failed to apply OCR callback for slip {}: {}",
            report.slip_id,
            e
        );
    }

    Ok(Json(json!({ "status": "ok" })))
}

/// GET /health
///
/// `pending` is the number of slips waiting on the worker; a number that
/// only grows points at lost jobs.
pub async fn health(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let pending = state.service.pending_count()?;
    Ok(Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "pending": pending,
    })))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound("Not Found".into())
}
