//! HTTP handlers

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::types::report::{HealthReport, ModelInfo, PredictionResponse};
use axum::extract::{Multipart, State};
use axum::Json;

/// Multipart field carrying the upload
pub const FILE_FIELD: &str = "file";

pub async fn predict(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<PredictionResponse>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;

        let response = state
            .service
            .predict_upload(bytes.to_vec(), filename.as_deref(), content_type.as_deref())
            .await?;
        return Ok(Json(response));
    }

    Err(ApiError::BadRequest("No file provided".to_string()))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.service.health())
}

pub async fn model_info(State(state): State<AppState>) -> Json<ModelInfo> {
    Json(state.service.model_info())
}
