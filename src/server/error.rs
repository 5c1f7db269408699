//! HTTP error mapping

use crate::error::ServiceError;
use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// Malformed request, e.g. no `file` field
    BadRequest(String),
    Multipart(MultipartError),
    Service(ServiceError),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Multipart(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Multipart(err) => (err.status(), err.body_text()),
            ApiError::Service(err) => {
                let status = match err {
                    ServiceError::Decode(_) => StatusCode::BAD_REQUEST,
                    ServiceError::NoModelsLoaded => StatusCode::SERVICE_UNAVAILABLE,
                    ServiceError::AllModelsFailed { failures } => {
                        tracing::error!(failed = failures.len(), "All models failed");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                    ServiceError::Internal(msg) => {
                        tracing::error!("Internal error: {}", msg);
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, err.to_string())
            }
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}
