//! Rate limiting error types for HTTP responses.

use axum::http::header::HeaderValue;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::ratelimit::RateLimitResult;

/// Errors that can occur during rate limit / loop-guard checks.
#[derive(Debug)]
pub enum RateLimitError {
    /// Redis is unavailable. Callers decide whether to fail open or closed.
    RedisUnavailable,
    /// Either the sustained or burst window was exceeded.
    LimitExceeded(RateLimitResult),
    /// The loop guard tripped: the same (credential, payload) pair recurred
    /// too many times within its window.
    LoopGuardTripped { retry_after: u64 },
}

/// JSON response body for rate limit errors.
///
/// `error` carries the human-readable message, `code` the stable
/// machine-readable identifier.
#[derive(Serialize)]
pub struct RateLimitErrorResponse {
    pub error: String,
    pub code: &'static str,
    pub retry_after: u64,
    pub limit: u32,
    pub remaining: u32,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        match self {
            Self::RedisUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"error": "rate limit backend unavailable", "code": "SERVICE_UNAVAILABLE"})),
            )
                .into_response(),
            Self::LimitExceeded(result) => {
                let body = RateLimitErrorResponse {
                    error: format!("Too many requests. Wait {} seconds.", result.retry_after),
                    code: "RATE_LIMITED",
                    retry_after: result.retry_after,
                    limit: result.limit,
                    remaining: result.remaining,
                };
                let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                if let Ok(v) = HeaderValue::from_str(&result.retry_after.to_string()) {
                    response.headers_mut().insert("Retry-After", v);
                }
                response
            }
            Self::LoopGuardTripped { retry_after } => {
                let body = RateLimitErrorResponse {
                    error: "Repeated identical job payload exceeded the loop guard threshold"
                        .to_string(),
                    code: "LOOP_GUARD_TRIPPED",
                    retry_after,
                    limit: 0,
                    remaining: 0,
                };
                let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                if let Ok(v) = HeaderValue::from_str(&retry_after.to_string()) {
                    response.headers_mut().insert("Retry-After", v);
                }
                response
            }
        }
    }
}
