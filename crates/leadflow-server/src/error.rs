use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use leadflow_core::extraction::{ExtractionError, ExtractionFailureKind, PARSE_FAILED_MESSAGE};
use leadflow_core::form::ValidationErrors;
use leadflow_storage::StorageError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("export failed: {0}")]
    Export(#[from] serde_json::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(errors) => {
                let status = StatusCode::UNPROCESSABLE_ENTITY;
                let body = Json(json!({
                    "error": "validation failed",
                    "status": status.as_u16(),
                    "issues": errors.issues,
                }));
                return (status, body).into_response();
            }
            ApiError::InvalidRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            ApiError::Storage(StorageError::NotFound { collection, id }) => (
                StatusCode::NOT_FOUND,
                format!("{collection} not found: {id}"),
            ),
            ApiError::Storage(err) if err.is_unavailable() => {
                error!(event = "storage_unavailable", error = %err);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "storage unavailable".to_string(),
                )
            }
            ApiError::Storage(err) => {
                error!(event = "storage_error", error = %err);
                (StatusCode::INTERNAL_SERVER_ERROR, "storage error".to_string())
            }
            ApiError::Extraction(err) if err.kind == ExtractionFailureKind::EmptyInput => {
                (StatusCode::BAD_REQUEST, err.message.clone())
            }
            ApiError::Extraction(_) => (StatusCode::BAD_GATEWAY, PARSE_FAILED_MESSAGE.to_string()),
            ApiError::Export(err) => {
                error!(event = "export_error", error = %err);
                (StatusCode::INTERNAL_SERVER_ERROR, "export failed".to_string())
            }
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
