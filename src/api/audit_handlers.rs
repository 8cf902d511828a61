//! Audit log listing (§6 `/api/v1/audit-logs`).

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::api::AppState;
use crate::auth::ResolvedCredential;
use crate::db::AuditEntry;

#[derive(Debug, Deserialize)]
pub struct ListAuditLogsQuery {
    pub after_id: Option<Uuid>,
    pub limit: Option<i64>,
}

const DEFAULT_PAGE_SIZE: i64 = 100;
const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AuditLogPage {
    pub entries: Vec<AuditEntry>,
    pub next_after_id: Option<Uuid>,
}

/// GET /api/v1/audit-logs?after_id&limit - cursor-paginated audit trail for the tenant.
#[utoipa::path(
    get,
    path = "/api/v1/audit-logs",
    tag = "audit",
    params(
        ("after_id" = Option<Uuid>, Query, description = "Cursor: return entries after this id"),
        ("limit" = Option<i64>, Query, description = "Page size, default 100, max 500"),
    ),
    responses((status = 200, description = "Audit log page", body = AuditLogPage)),
    security(("bearer_auth" = [])),
)]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    credential: ResolvedCredential,
    Query(query): Query<ListAuditLogsQuery>,
) -> ApiResult<Json<AuditLogPage>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let entries = crate::audit::list_page(&state.db, credential.tenant_id, query.after_id, limit).await?;
    let next_after_id = entries.last().map(|e| e.id);

    Ok(Json(AuditLogPage {
        entries,
        next_after_id,
    }))
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use super::*;
    use crate::api::test_support::{insert_test_tenant, test_state};
    use crate::db::CredentialScope;

    fn reader(tenant_id: Uuid) -> ResolvedCredential {
        ResolvedCredential {
            id: Uuid::new_v4(),
            tenant_id,
            scope: CredentialScope::Read,
        }
    }

    #[sqlx::test]
    async fn pages_in_id_order_and_reports_cursor(pool: PgPool) {
        let tenant_id = insert_test_tenant(&pool).await;
        let state = test_state(pool).await;

        for i in 0..3 {
            crate::audit::record(
                &state.db,
                tenant_id,
                "system",
                "test.event",
                "tenant",
                &tenant_id.to_string(),
                serde_json::json!({ "i": i }),
                None,
            )
            .await;
        }

        let Json(first_page) = list_audit_logs(
            State(state.clone()),
            reader(tenant_id),
            Query(ListAuditLogsQuery {
                after_id: None,
                limit: Some(2),
            }),
        )
        .await
        .expect("list_audit_logs failed");

        assert_eq!(first_page.entries.len(), 2);
        assert_eq!(first_page.next_after_id, Some(first_page.entries[1].id));

        let Json(second_page) = list_audit_logs(
            State(state),
            reader(tenant_id),
            Query(ListAuditLogsQuery {
                after_id: first_page.next_after_id,
                limit: Some(2),
            }),
        )
        .await
        .expect("list_audit_logs failed");

        assert_eq!(second_page.entries.len(), 1);
        assert!(second_page.next_after_id.is_some());
    }
}
