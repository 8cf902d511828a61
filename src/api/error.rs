//! Shared handler error type for the §6 HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("resource not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Gone(String),
    #[error("export not ready")]
    ExportNotReady,
    #[error("confirm_email did not match the account email")]
    EmailMismatch,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Admission(#[from] crate::jobs::AdmissionError),
    #[error(transparent)]
    Cron(#[from] crate::schedule::CronError),
    #[error(transparent)]
    S3(#[from] crate::s3::S3Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::Gone(_) => (StatusCode::GONE, "EXPORT_NOT_READY"),
            Self::ExportNotReady => (StatusCode::BAD_REQUEST, "EXPORT_NOT_READY"),
            Self::EmailMismatch => (StatusCode::BAD_REQUEST, "EMAIL_MISMATCH"),
            Self::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::Admission(crate::jobs::AdmissionError::TenantNotFound) => {
                (StatusCode::NOT_FOUND, "TENANT_NOT_FOUND")
            }
            Self::Admission(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::Cron(_) => (StatusCode::BAD_REQUEST, "INVALID_CRON_EXPRESSION"),
            Self::S3(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        };

        let body = Json(ErrorBody {
            error: self.to_string(),
            code: code.to_string(),
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
