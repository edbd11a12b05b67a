use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::access::AccessError;
use crate::services::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Don't expose internal error details
        let body = match &self {
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Request failed");
                "Internal error".to_string()
            }
            _ => self.to_string(),
        };

        (status, body).into_response()
    }
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::DuplicateRole(_) => AppError::Conflict(err.to_string()),
            AccessError::NotFound { .. } => AppError::NotFound(err.to_string()),
            AccessError::InvalidInput(msg) => AppError::InvalidInput(msg),
            AccessError::Store(store) => store.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) => {
                tracing::warn!(error = %err, "Document store unavailable");
                AppError::ServiceUnavailable("document store".to_string())
            }
            StoreError::Persistence(_) | StoreError::Serialization(_) => {
                AppError::Internal(anyhow::Error::new(err))
            }
        }
    }
}

impl From<garde::Report> for AppError {
    fn from(report: garde::Report) -> Self {
        AppError::InvalidInput(report.to_string())
    }
}
