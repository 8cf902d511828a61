//! Insert-only audit logging facade (§3, §9).
//!
//! The only sanctioned write path for the audit table outside the privileged
//! erasure-time anonymization in `db::anonymize_audit_entries_for_tenant`.
//! Handlers and engines call [`record`] rather than `db::insert_audit_entry`
//! directly, so every audit write passes through one call site.

use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::db::{self, AuditEntry};

pub async fn record(
    pool: &PgPool,
    tenant_id: Uuid,
    actor: &str,
    action: &str,
    target_type: &str,
    target_id: &str,
    metadata: serde_json::Value,
    ip: Option<&str>,
) {
    if let Err(e) =
        db::insert_audit_entry(pool, tenant_id, actor, action, target_type, target_id, metadata, ip)
            .await
    {
        warn!(tenant_id = %tenant_id, action, error = %e, "failed to write audit entry");
    }
}

pub async fn list_page(
    pool: &PgPool,
    tenant_id: Uuid,
    after_id: Option<Uuid>,
    limit: i64,
) -> sqlx::Result<Vec<AuditEntry>> {
    db::audit_entries_page(pool, tenant_id, after_id, limit).await
}
