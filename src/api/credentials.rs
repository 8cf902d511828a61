//! Credential (API key) management (§6 `/api/v1/keys`).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::auth::{generate_secret, ResolvedCredential};
use crate::db::{self, CredentialScope};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateKeyRequest {
    pub scope: CredentialScope,
    #[serde(default)]
    pub ip_allowlist: Vec<String>,
    pub rate_limit_override: Option<i32>,
    pub label: Option<String>,
}

/// A credential as returned by the listing/creation endpoints. Never carries
/// `secret_digest`; the plaintext secret is surfaced exactly once, on creation.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct KeyView {
    pub id: Uuid,
    pub prefix: String,
    pub scope: CredentialScope,
    pub ip_allowlist: Vec<String>,
    pub rate_limit_override: Option<i32>,
    pub revoked: bool,
    pub revoked_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_used_at: Option<chrono::DateTime<chrono::Utc>>,
    pub label: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<db::Credential> for KeyView {
    fn from(c: db::Credential) -> Self {
        Self {
            id: c.id,
            prefix: c.prefix,
            scope: c.scope,
            ip_allowlist: c.ip_allowlist,
            rate_limit_override: c.rate_limit_override,
            revoked: c.revoked,
            revoked_at: c.revoked_at,
            last_used_at: c.last_used_at,
            label: c.label,
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CreateKeyResponse {
    #[serde(flatten)]
    pub key: KeyView,
    /// The full plaintext secret. Returned exactly once; never recoverable afterward.
    pub secret: String,
}

/// GET /api/v1/keys - list the caller's tenant's credentials.
#[utoipa::path(
    get,
    path = "/api/v1/keys",
    tag = "keys",
    responses((status = 200, description = "Credentials for the authenticated tenant", body = [KeyView])),
    security(("bearer_auth" = [])),
)]
pub async fn list_keys(
    State(state): State<AppState>,
    credential: ResolvedCredential,
) -> ApiResult<Json<Vec<KeyView>>> {
    let rows = db::list_credentials(&state.db, credential.tenant_id).await?;
    Ok(Json(rows.into_iter().map(KeyView::from).collect()))
}

/// POST /api/v1/keys - mint a new credential. Requires ADMIN scope.
#[utoipa::path(
    post,
    path = "/api/v1/keys",
    tag = "keys",
    request_body = CreateKeyRequest,
    responses((status = 201, description = "Credential created", body = CreateKeyResponse)),
    security(("bearer_auth" = [])),
)]
pub async fn create_key(
    State(state): State<AppState>,
    credential: ResolvedCredential,
    Json(request): Json<CreateKeyRequest>,
) -> ApiResult<(StatusCode, Json<CreateKeyResponse>)> {
    for cidr in &request.ip_allowlist {
        if cidr.parse::<ipnet::IpNet>().is_err() {
            return Err(ApiError::Validation(format!("invalid CIDR in ip_allowlist: {cidr}")));
        }
    }

    let generated = generate_secret();
    let row = db::create_credential(
        &state.db,
        credential.tenant_id,
        &generated.prefix,
        &generated.digest,
        request.scope,
        &request.ip_allowlist,
        request.rate_limit_override,
        request.label.as_deref(),
    )
    .await?;

    crate::audit::record(
        &state.db,
        credential.tenant_id,
        &credential.id.to_string(),
        "key.created",
        "credential",
        &row.id.to_string(),
        serde_json::json!({ "scope": request.scope }),
        None,
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(CreateKeyResponse {
            key: KeyView::from(row),
            secret: generated.plaintext,
        }),
    ))
}

/// DELETE /api/v1/keys/:id - revoke a credential. Requires ADMIN scope.
#[utoipa::path(
    delete,
    path = "/api/v1/keys/{id}",
    tag = "keys",
    params(("id" = Uuid, Path, description = "Credential id")),
    responses(
        (status = 204, description = "Credential revoked"),
        (status = 404, description = "Credential not found"),
        (status = 409, description = "Credential already revoked"),
    ),
    security(("bearer_auth" = [])),
)]
pub async fn revoke_key(
    State(state): State<AppState>,
    credential: ResolvedCredential,
    Path(key_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    match db::revoke_credential(&state.db, key_id, credential.tenant_id).await? {
        None => Err(ApiError::NotFound),
        Some(false) => Err(ApiError::Validation("credential already revoked".into())),
        Some(true) => {
            crate::audit::record(
                &state.db,
                credential.tenant_id,
                &credential.id.to_string(),
                "key.revoked",
                "credential",
                &key_id.to_string(),
                serde_json::json!({}),
                None,
            )
            .await;
            Ok(StatusCode::NO_CONTENT)
        }
    }
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use super::*;
    use crate::api::test_support::{insert_test_tenant, test_state};

    fn admin(tenant_id: Uuid) -> ResolvedCredential {
        ResolvedCredential {
            id: Uuid::new_v4(),
            tenant_id,
            scope: CredentialScope::Admin,
        }
    }

    #[sqlx::test]
    async fn create_key_rejects_malformed_cidr(pool: PgPool) {
        let tenant_id = insert_test_tenant(&pool).await;
        let state = test_state(pool).await;

        let result = create_key(
            State(state),
            admin(tenant_id),
            Json(CreateKeyRequest {
                scope: CredentialScope::Read,
                ip_allowlist: vec!["not-a-cidr".into()],
                rate_limit_override: None,
                label: None,
            }),
        )
        .await;

        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[sqlx::test]
    async fn create_list_and_revoke_round_trip(pool: PgPool) {
        let tenant_id = insert_test_tenant(&pool).await;
        let state = test_state(pool).await;

        let (status, Json(created)) = create_key(
            State(state.clone()),
            admin(tenant_id),
            Json(CreateKeyRequest {
                scope: CredentialScope::Write,
                ip_allowlist: vec!["10.0.0.0/8".into()],
                rate_limit_override: Some(42),
                label: Some("ci".into()),
            }),
        )
        .await
        .expect("create_key failed");

        assert_eq!(status, StatusCode::CREATED);
        assert!(created.secret.starts_with("ek_"));
        assert_eq!(created.key.scope, CredentialScope::Write);

        let Json(listed) = list_keys(State(state.clone()), admin(tenant_id))
            .await
            .expect("list_keys failed");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.key.id);

        let revoke_status = revoke_key(State(state.clone()), admin(tenant_id), Path(created.key.id))
            .await
            .expect("revoke_key failed");
        assert_eq!(revoke_status, StatusCode::NO_CONTENT);

        let second = revoke_key(State(state), admin(tenant_id), Path(created.key.id)).await;
        assert!(matches!(second, Err(ApiError::Validation(_))));
    }

    #[sqlx::test]
    async fn revoke_key_missing_is_not_found(pool: PgPool) {
        let tenant_id = insert_test_tenant(&pool).await;
        let state = test_state(pool).await;

        let result = revoke_key(State(state), admin(tenant_id), Path(Uuid::new_v4())).await;
        assert!(matches!(result, Err(ApiError::NotFound)));
    }
}
