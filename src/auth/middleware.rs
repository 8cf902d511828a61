//! Authentication middleware: the key & auth gate (credential resolution,
//! scope check, IP allowlist).

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use tracing::warn;
use uuid::Uuid;

use super::credential::{
    hash_secret, internal_dashboard_credential_id, ip_allowed, scope_permits,
};
use super::error::AuthError;
use crate::api::AppState;
use crate::db::{find_credential_by_digest, touch_credential_last_used, Credential, CredentialScope};
use crate::ratelimit::{extract_client_ip, normalize_ip, NormalizedIp};

/// Resolved credential, attached to request extensions after a successful auth gate.
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub scope: CredentialScope,
}

impl From<&Credential> for ResolvedCredential {
    fn from(credential: &Credential) -> Self {
        Self {
            id: credential.id,
            tenant_id: credential.tenant_id,
            scope: credential.scope,
        }
    }
}

/// Header pair that proves a request originates from the trusted in-process
/// dashboard rather than the public edge.
const INTERNAL_DASHBOARD_ORIGIN_HEADER: &str = "x-internal-dashboard-origin";
const INTERNAL_DASHBOARD_TENANT_HEADER: &str = "x-internal-dashboard-tenant";

/// The key & auth gate (§4.1): resolves a bearer credential or the internal
/// dashboard path, checks scope against the HTTP method, and enforces the
/// credential's IP allowlist.
pub async fn require_credential(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if let Some(resolved) = try_internal_dashboard(&state, &request) {
        request.extensions_mut().insert(resolved);
        return Ok(next.run(request).await);
    }

    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingAuthHeader)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeader)?;

    let digest = hash_secret(token);
    let credential = find_credential_by_digest(&state.db, &digest)
        .await?
        .ok_or(AuthError::InvalidCredential)?;

    if credential.revoked {
        return Err(AuthError::InvalidCredential);
    }

    if !scope_permits(credential.scope, request.method()) {
        return Err(AuthError::InsufficientScope);
    }

    let trust_proxy = state.config.trust_proxy;
    let client_ip = extract_client_ip(request.headers(), connect_info.as_ref(), trust_proxy);
    if !ip_allowed(&credential.ip_allowlist, client_ip) {
        return Err(AuthError::IpNotAllowed);
    }

    request
        .extensions_mut()
        .insert(NormalizedIp(normalize_ip(client_ip)));

    let resolved = ResolvedCredential::from(&credential);
    request.extensions_mut().insert(resolved);

    // Best-effort, asynchronous: failure here must never fail the request.
    let db = state.db.clone();
    let credential_id = credential.id;
    tokio::spawn(async move {
        if let Err(err) = touch_credential_last_used(&db, credential_id).await {
            warn!(error = %err, credential_id = %credential_id, "failed to update last_used_at");
        }
    });

    Ok(next.run(request).await)
}

/// Resolve the internal-dashboard auth path. Only usable when the configured
/// shared secret is present and matches, which in practice means this path is
/// never reachable from the public edge (no ingress forwards it there).
fn try_internal_dashboard(state: &AppState, request: &Request) -> Option<ResolvedCredential> {
    use subtle::ConstantTimeEq;

    let configured_secret = state.config.internal_dashboard_secret.as_ref()?;

    let presented = request
        .headers()
        .get(INTERNAL_DASHBOARD_ORIGIN_HEADER)
        .and_then(|h| h.to_str().ok())?;

    if presented.as_bytes().ct_eq(configured_secret.as_bytes()).into() {
        let tenant_id: Uuid = request
            .headers()
            .get(INTERNAL_DASHBOARD_TENANT_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse().ok())?;

        return Some(ResolvedCredential {
            id: internal_dashboard_credential_id(tenant_id),
            tenant_id,
            scope: CredentialScope::Admin,
        });
    }

    None
}

impl<S> axum::extract::FromRequestParts<S> for ResolvedCredential
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(AuthError::MissingAuthHeader)
    }
}

impl<S> axum::extract::OptionalFromRequestParts<S> for ResolvedCredential
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_dashboard_header_names_are_lowercase() {
        // axum's HeaderMap lookups are case-insensitive regardless, but keep the
        // constants lowercase to match how they're written in requests/tests.
        assert_eq!(INTERNAL_DASHBOARD_ORIGIN_HEADER, "x-internal-dashboard-origin");
        assert_eq!(INTERNAL_DASHBOARD_TENANT_HEADER, "x-internal-dashboard-tenant");
    }
}
