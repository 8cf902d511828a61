//! Authentication error types.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use thiserror::Error;

/// Authentication error types.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing Authorization header.
    #[error("Missing authorization header")]
    MissingAuthHeader,

    /// Invalid authorization header format (not `Bearer <token>`).
    #[error("Invalid authorization header format")]
    InvalidAuthHeader,

    /// Credential not found, revoked, or digest mismatch.
    #[error("Invalid or revoked credential")]
    InvalidCredential,

    /// Credential's scope is insufficient for this operation.
    #[error("Insufficient credential scope")]
    InsufficientScope,

    /// Caller's IP is not on the credential's allowlist.
    #[error("Source IP is not permitted for this credential")]
    IpNotAllowed,

    /// Database error.
    #[error("Database error")]
    Database(#[from] sqlx::Error),

    /// Internal server error.
    #[error("Internal server error")]
    Internal(String),
}

/// Error response body for JSON responses.
///
/// `error` carries the human-readable message, `code` the stable
/// machine-readable identifier a client can branch on.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::MissingAuthHeader => (StatusCode::UNAUTHORIZED, "MISSING_AUTH"),
            Self::InvalidAuthHeader => (StatusCode::UNAUTHORIZED, "INVALID_AUTH_HEADER"),
            Self::InvalidCredential => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIAL"),
            Self::InsufficientScope => (StatusCode::FORBIDDEN, "INSUFFICIENT_SCOPE"),
            Self::IpNotAllowed => (StatusCode::FORBIDDEN, "IP_NOT_ALLOWED"),
            Self::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
