//! Consent-aware notification dispatch (§4.7).
//!
//! Thin layer over [`crate::email::EmailService`] that re-reads the tenant's
//! consent flags immediately before sending rather than at enqueue time, so a
//! consent withdrawal between job completion and send time is honored.
//!
//! Transactional templates (completion, failure, deletion confirmation,
//! pre-deletion reminder) are gated on `transactional_consent`. Marketing
//! templates (usage alerts) are gated on `marketing_consent`. Templates for
//! account verification, team invites, and sub-processor change notices are
//! not implemented: this crate's data model has no session/verification,
//! team-membership, or sub-processor entities to notify about (see
//! `DESIGN.md`).

use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::db::{self, Tenant};
use crate::email::EmailService;

pub async fn notify_export_completed(
    email: &EmailService,
    pool: &PgPool,
    tenant_id: Uuid,
    download_url: &str,
) -> anyhow::Result<()> {
    let Some(tenant) = refresh_tenant(pool, tenant_id).await? else {
        return Ok(());
    };
    if !tenant.transactional_consent {
        return Ok(());
    }
    email
        .send_export_completed(&tenant.email, tenant.brand_footer.as_deref(), download_url)
        .await
}

pub async fn notify_export_failed(
    email: &EmailService,
    pool: &PgPool,
    tenant_id: Uuid,
    error_summary: &str,
) -> anyhow::Result<()> {
    let Some(tenant) = refresh_tenant(pool, tenant_id).await? else {
        return Ok(());
    };
    if !tenant.transactional_consent {
        return Ok(());
    }
    email
        .send_export_failed(&tenant.email, tenant.brand_footer.as_deref(), error_summary)
        .await
}

pub async fn notify_deletion_confirmed(
    email: &EmailService,
    pool: &PgPool,
    tenant_id: Uuid,
) -> anyhow::Result<()> {
    let Some(tenant) = refresh_tenant(pool, tenant_id).await? else {
        return Ok(());
    };
    if !tenant.transactional_consent {
        return Ok(());
    }
    email.send_deletion_confirmation(&tenant.email).await
}

pub async fn notify_pre_deletion_reminder(
    email: &EmailService,
    pool: &PgPool,
    tenant_id: Uuid,
    job_id: Uuid,
) -> anyhow::Result<()> {
    let Some(tenant) = refresh_tenant(pool, tenant_id).await? else {
        return Ok(());
    };
    if !tenant.transactional_consent || !tenant.pre_deletion_notice_consent {
        return Ok(());
    }
    email
        .send_pre_deletion_reminder(&tenant.email, &job_id.to_string())
        .await
}

pub async fn notify_usage_alert(
    email: &EmailService,
    pool: &PgPool,
    tenant_id: Uuid,
    rows_this_period: i64,
) -> anyhow::Result<()> {
    let Some(tenant) = refresh_tenant(pool, tenant_id).await? else {
        return Ok(());
    };
    if !tenant.marketing_consent {
        return Ok(());
    }
    email.send_usage_alert(&tenant.email, rows_this_period).await
}

async fn refresh_tenant(pool: &PgPool, tenant_id: Uuid) -> anyhow::Result<Option<Tenant>> {
    match db::find_tenant(pool, tenant_id).await {
        Ok(tenant) => Ok(tenant),
        Err(e) => {
            warn!(tenant_id = %tenant_id, error = %e, "failed to refresh tenant for notification consent check");
            Ok(None)
        }
    }
}
