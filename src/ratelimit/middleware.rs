//! Axum middleware applying the rate-limit tiers to credential-scoped requests.
//!
//! Unlike IP-based limiting, every route here sits behind the auth gate, so the
//! identifier is always the resolved credential id, not the caller's address.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::api::AppState;
use crate::auth::ResolvedCredential;
use crate::ratelimit::{RateLimitCategory, RateLimitError};

/// Sets the rate-limit tier for downstream middleware. Apply before
/// [`rate_limit_by_credential`] on each route group.
pub fn with_category(
    category: RateLimitCategory,
) -> impl Fn(Request, Next) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>
       + Clone
       + Send
       + 'static {
    move |mut request: Request, next: Next| {
        request.extensions_mut().insert(category);
        Box::pin(async move { next.run(request).await })
    }
}

/// Enforces the sustained+burst rate-limit tier for the resolved credential (§4.2).
///
/// Requires [`crate::auth::require_credential`] to have already run so a
/// [`ResolvedCredential`] is present in request extensions.
#[tracing::instrument(skip(state, request, next))]
pub async fn rate_limit_by_credential(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    let category = request
        .extensions()
        .get::<RateLimitCategory>()
        .copied()
        .unwrap_or(RateLimitCategory::General);

    let Some(ref limiter) = state.rate_limiter else {
        return Ok(next.run(request).await);
    };

    let identifier = request
        .extensions()
        .get::<ResolvedCredential>()
        .map(|c| c.id.to_string())
        .unwrap_or_else(|| "anonymous".to_string());

    let result = match limiter.check(category, &identifier).await {
        Ok(result) => result,
        Err(RateLimitError::RedisUnavailable) => {
            if limiter.config().fail_open {
                warn!(
                    category = %category.as_str(),
                    identifier,
                    "redis unavailable, allowing request (fail_open=true)"
                );
                return Ok(next.run(request).await);
            }
            return Err(RateLimitError::RedisUnavailable);
        }
        Err(e) => return Err(e),
    };

    if !result.allowed {
        debug!(
            category = %category.as_str(),
            identifier,
            retry_after = result.retry_after,
            "rate limit exceeded"
        );
        return Err(RateLimitError::LimitExceeded(result));
    }

    let mut response = next.run(request).await;
    annotate_headers(&mut response, &result);
    Ok(response)
}

/// Attaches limit/remaining/reset headers, always advertised per §4.2.
fn annotate_headers(response: &mut Response, result: &crate::ratelimit::RateLimitResult) {
    use axum::http::HeaderValue;
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&result.limit.to_string()) {
        headers.insert("X-RateLimit-Limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&result.remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", v);
    }
    if let Ok(v) = HeaderValue::from_str(&result.reset_at.to_string()) {
        headers.insert("X-RateLimit-Reset", v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_category_builds_a_layer_fn() {
        let _middleware = with_category(RateLimitCategory::ExportCreation);
    }
}
