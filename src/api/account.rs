//! GDPR account data export and erasure (§6 `/api/v1/account/*`).
//!
//! Grounded on the collect-then-delete shape of the teacher's account
//! deletion worker, run synchronously here (request-scoped, not a background
//! sweep) since erasure is tenant-initiated rather than grace-period-driven.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::auth::{hash_secret, ResolvedCredential};
use crate::db;

const DATA_EXPORT_PAGE_SIZE: i64 = 1000;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DataExportResponse {
    pub download_url: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub file_size: u64,
}

/// GET /api/v1/account/data-export - build and sign a one-off GDPR archive.
#[utoipa::path(
    get,
    path = "/api/v1/account/data-export",
    tag = "account",
    responses((status = 200, description = "Archive ready", body = DataExportResponse)),
    security(("bearer_auth" = [])),
)]
pub async fn request_data_export(
    State(state): State<AppState>,
    credential: ResolvedCredential,
) -> ApiResult<Json<DataExportResponse>> {
    let tenant = db::find_tenant(&state.db, credential.tenant_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let jobs = db::list_jobs(&state.db, credential.tenant_id, None, DATA_EXPORT_PAGE_SIZE, 0).await?;
    let credentials = db::list_credentials(&state.db, credential.tenant_id).await?;
    let schedules = db::list_schedules(&state.db, credential.tenant_id).await?;
    let audit_entries =
        db::list_audit_entries(&state.db, credential.tenant_id, DATA_EXPORT_PAGE_SIZE, 0).await?;

    let archive = serde_json::json!({
        "tenant": {
            "id": tenant.id,
            "name": tenant.name,
            "email": tenant.email,
            "plan_tier": tenant.plan_tier,
            "created_at": tenant.created_at,
        },
        "jobs": jobs,
        "credentials": credentials.iter().map(|c| serde_json::json!({
            "id": c.id,
            "prefix": c.prefix,
            "scope": c.scope,
            "revoked": c.revoked,
            "created_at": c.created_at,
        })).collect::<Vec<_>>(),
        "schedules": schedules,
        "audit_entries": audit_entries,
    });

    let bytes = serde_json::to_vec_pretty(&archive)
        .map_err(|e| ApiError::Validation(format!("failed to serialize data export archive: {e}")))?;
    let file_size = bytes.len() as u64;

    let object_key = format!(
        "data-exports/{}/{}.json",
        tenant.id,
        chrono::Utc::now().format("%Y%m%dT%H%M%SZ")
    );
    state.s3.put_object(&object_key, bytes, "application/json").await?;

    let download_url = state.s3.presign_get_long(&object_key).await?;

    crate::audit::record(
        &state.db,
        credential.tenant_id,
        &credential.id.to_string(),
        "account.data_export_requested",
        "tenant",
        &tenant.id.to_string(),
        serde_json::json!({}),
        None,
    )
    .await;

    Ok(Json(DataExportResponse {
        download_url,
        expires_at: chrono::Utc::now()
            + chrono::Duration::seconds(state.config.s3_presign_expiry_long_secs as i64),
        file_size,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DeleteAccountRequest {
    pub confirm_email: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DeleteAccountResponse {
    pub success: bool,
    pub r2_objects_deleted: u64,
    pub audit_logs_anonymized: u64,
    pub r2_errors: Vec<String>,
}

/// DELETE /api/v1/account - erase a tenant's exported files and account row.
///
/// Email confirmation guards against a stolen-credential request silently
/// erasing the account: the caller must echo the tenant's contact email back.
#[utoipa::path(
    delete,
    path = "/api/v1/account",
    tag = "account",
    request_body = DeleteAccountRequest,
    responses(
        (status = 200, description = "Account erased", body = DeleteAccountResponse),
        (status = 400, description = "confirm_email did not match"),
        (status = 404, description = "Tenant not found"),
    ),
    security(("bearer_auth" = [])),
)]
pub async fn delete_account(
    State(state): State<AppState>,
    credential: ResolvedCredential,
    Json(request): Json<DeleteAccountRequest>,
) -> ApiResult<Json<DeleteAccountResponse>> {
    let tenant = db::find_tenant(&state.db, credential.tenant_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if !request.confirm_email.eq_ignore_ascii_case(&tenant.email) {
        return Err(ApiError::EmailMismatch);
    }

    let salted_hash = hash_secret(&format!("erased-tenant:{}", tenant.id));
    let audit_logs_anonymized =
        db::anonymize_audit_entries_for_tenant(&state.db, tenant.id, &salted_hash).await?;

    let (r2_objects_deleted, r2_errors) =
        state.s3.delete_prefix(&format!("exports/{}/", tenant.id)).await;

    if let Some(pre_deletion_email) = state.email.as_deref() {
        if tenant.transactional_consent {
            if let Err(e) = pre_deletion_email.send_deletion_confirmation(&tenant.email).await {
                tracing::warn!(tenant_id = %tenant.id, error = %e, "failed to send deletion confirmation email");
            }
        }
    }

    db::delete_tenant(&state.db, tenant.id).await?;

    Ok(Json(DeleteAccountResponse {
        success: true,
        r2_objects_deleted,
        audit_logs_anonymized,
        r2_errors,
    }))
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;
    use uuid::Uuid;

    use super::*;
    use crate::api::test_support::{insert_test_tenant, test_state};
    use crate::db::CredentialScope;

    fn admin(tenant_id: Uuid) -> ResolvedCredential {
        ResolvedCredential {
            id: Uuid::new_v4(),
            tenant_id,
            scope: CredentialScope::Admin,
        }
    }

    #[sqlx::test]
    async fn delete_account_rejects_mismatched_email(pool: PgPool) {
        let tenant_id = insert_test_tenant(&pool).await;
        let state = test_state(pool).await;

        let result = delete_account(
            State(state),
            admin(tenant_id),
            Json(DeleteAccountRequest {
                confirm_email: "wrong@example.test".into(),
            }),
        )
        .await;

        assert!(matches!(result, Err(ApiError::EmailMismatch)));
    }

    #[sqlx::test]
    async fn delete_account_erases_tenant_row(pool: PgPool) {
        let tenant_id = insert_test_tenant(&pool).await;
        let state = test_state(pool).await;
        let tenant = db::find_tenant(&state.db, tenant_id)
            .await
            .expect("find_tenant failed")
            .expect("tenant missing");

        let Json(response) = delete_account(
            State(state.clone()),
            admin(tenant_id),
            Json(DeleteAccountRequest {
                confirm_email: tenant.email.clone(),
            }),
        )
        .await
        .expect("delete_account failed");

        assert!(response.success);
        assert!(db::find_tenant(&state.db, tenant_id)
            .await
            .expect("find_tenant failed")
            .is_none());
    }
}
