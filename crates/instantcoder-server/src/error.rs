//! Error types for the HTTP server

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use instantcoder_engine::GenerationError;
use instantcoder_inference::BackendError;
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::export::ExportError;

/// Errors returned by request handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// The submission was rejected before any state change
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A generation is already running for the session
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The model service failed
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Export failed: {0}")]
    Export(#[from] ExportError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::Export(ExportError::NotADirectory(_)) => StatusCode::NOT_FOUND,
            Self::Export(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "generation_in_progress",
            Self::Provider(_) => "provider_error",
            Self::Export(_) => "export_failed",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn session_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("Session not found: {}", id))
    }
}

impl From<GenerationError> for ApiError {
    fn from(error: GenerationError) -> Self {
        match error {
            GenerationError::Busy(_) => Self::Conflict(error.to_string()),
            e if e.is_validation() => Self::Validation(e.to_string()),
            e => Self::Provider(e.to_string()),
        }
    }
}

impl From<BackendError> for ApiError {
    fn from(error: BackendError) -> Self {
        Self::Provider(error.to_string())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("[api] {}", self);
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for request handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors that stop the server from starting
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("No enabled model in the configured catalog")]
    NoModel,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use instantcoder_engine::Status;

    #[test]
    fn test_generation_error_mapping() {
        let busy = ApiError::from(GenerationError::Busy(Status::Creating));
        assert_eq!(busy.status_code(), StatusCode::CONFLICT);

        let empty = ApiError::from(GenerationError::EmptyIntent);
        assert_eq!(empty.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(empty.error_code(), "validation_error");

        let nothing = ApiError::from(GenerationError::NothingToModify);
        assert_eq!(nothing.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        let invoke = ApiError::from(GenerationError::Invoke(BackendError::Api {
            status: 500,
            body: "boom".to_string(),
        }));
        assert_eq!(invoke.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_export_mapping() {
        let missing = ApiError::from(ExportError::NotADirectory("/nope".into()));
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(missing.error_code(), "export_failed");
    }

    #[test]
    fn test_response_status() {
        let response = ApiError::session_not_found("abc").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
