//! Database queries.
//!
//! Runtime queries (`sqlx::query` / `sqlx::query_as`) are used throughout so the
//! workspace does not require a live database at compile time.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{
    AuditEntry, Credential, CredentialScope, DeliveryStatus, Job, JobStatus, JobType, Schedule,
    Tenant, WebhookDelivery, WebhookEvent,
};

// ---------------------------------------------------------------------------
// Tenants
// ---------------------------------------------------------------------------

pub async fn find_tenant(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<Tenant>> {
    sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Read-modify-write the webhook circuit breaker fields after a delivery attempt.
/// Last-write-wins is acceptable per §5 (occasional over-counting is bounded).
pub async fn record_webhook_success(pool: &PgPool, tenant_id: Uuid) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE tenants SET webhook_consecutive_failures = 0, webhook_last_success_at = NOW()
         WHERE id = $1",
    )
    .bind(tenant_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn record_webhook_failure(pool: &PgPool, tenant_id: Uuid) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE tenants SET webhook_consecutive_failures = webhook_consecutive_failures + 1
         WHERE id = $1",
    )
    .bind(tenant_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Invariant 6: circuit is open iff failures >= 10 and last success was < 30 min ago
/// (or there has never been a success).
#[must_use]
pub fn webhook_circuit_open(tenant: &Tenant) -> bool {
    if tenant.webhook_consecutive_failures < 10 {
        return false;
    }
    match tenant.webhook_last_success_at {
        Some(last) => Utc::now().signed_duration_since(last) < chrono::Duration::minutes(30),
        None => true,
    }
}

/// GDPR erasure (§6 `DELETE /api/v1/account`). Cascades to credentials, jobs,
/// schedules, and usage records via foreign-key `ON DELETE CASCADE`; audit
/// entries are anonymized separately rather than deleted (insert-only, §3).
pub async fn delete_tenant(pool: &PgPool, id: Uuid) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
pub async fn create_credential(
    pool: &PgPool,
    tenant_id: Uuid,
    prefix: &str,
    secret_digest: &str,
    scope: CredentialScope,
    ip_allowlist: &[String],
    rate_limit_override: Option<i32>,
    label: Option<&str>,
) -> sqlx::Result<Credential> {
    sqlx::query_as::<_, Credential>(
        "INSERT INTO credentials
            (tenant_id, prefix, secret_digest, scope, ip_allowlist, rate_limit_override, label)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING *",
    )
    .bind(tenant_id)
    .bind(prefix)
    .bind(secret_digest)
    .bind(scope)
    .bind(ip_allowlist)
    .bind(rate_limit_override)
    .bind(label)
    .fetch_one(pool)
    .await
}

pub async fn find_credential_by_digest(
    pool: &PgPool,
    secret_digest: &str,
) -> sqlx::Result<Option<Credential>> {
    sqlx::query_as::<_, Credential>("SELECT * FROM credentials WHERE secret_digest = $1")
        .bind(secret_digest)
        .fetch_optional(pool)
        .await
}

pub async fn find_credential(
    pool: &PgPool,
    id: Uuid,
    tenant_id: Uuid,
) -> sqlx::Result<Option<Credential>> {
    sqlx::query_as::<_, Credential>(
        "SELECT * FROM credentials WHERE id = $1 AND tenant_id = $2",
    )
    .bind(id)
    .bind(tenant_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_credentials(pool: &PgPool, tenant_id: Uuid) -> sqlx::Result<Vec<Credential>> {
    sqlx::query_as::<_, Credential>(
        "SELECT * FROM credentials WHERE tenant_id = $1 ORDER BY created_at DESC",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await
}

/// Returns `true` if a row was revoked, `false` if it was already revoked (409 path).
pub async fn revoke_credential(
    pool: &PgPool,
    id: Uuid,
    tenant_id: Uuid,
) -> sqlx::Result<Option<bool>> {
    let row: Option<(bool,)> = sqlx::query_as(
        "SELECT revoked FROM credentials WHERE id = $1 AND tenant_id = $2",
    )
    .bind(id)
    .bind(tenant_id)
    .fetch_optional(pool)
    .await?;

    let Some((already_revoked,)) = row else {
        return Ok(None);
    };
    if already_revoked {
        return Ok(Some(false));
    }

    sqlx::query(
        "UPDATE credentials SET revoked = true, revoked_at = NOW() WHERE id = $1 AND tenant_id = $2",
    )
    .bind(id)
    .bind(tenant_id)
    .execute(pool)
    .await?;

    Ok(Some(true))
}

pub async fn touch_credential_last_used(pool: &PgPool, id: Uuid) -> sqlx::Result<()> {
    sqlx::query("UPDATE credentials SET last_used_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn credential_has_live_jobs(pool: &PgPool, id: Uuid) -> sqlx::Result<bool> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS(
            SELECT 1 FROM jobs
            WHERE credential_id = $1 AND status IN ('queued', 'processing')
         )",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

/// Retention engine step 1 (§4.9): revoked credentials past the grace period with
/// no still-live job referencing them are permanently deleted.
pub async fn delete_stale_revoked_credentials(pool: &PgPool, older_than_days: i32) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "DELETE FROM credentials
         WHERE revoked = true
           AND revoked_at < NOW() - make_interval(days => $1)
           AND NOT EXISTS (
               SELECT 1 FROM jobs
               WHERE jobs.credential_id = credentials.id
                 AND jobs.status IN ('queued', 'processing')
           )",
    )
    .bind(older_than_days)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

pub async fn insert_job(
    pool: &PgPool,
    tenant_id: Uuid,
    credential_id: Option<Uuid>,
    job_type: JobType,
    payload: serde_json::Value,
) -> sqlx::Result<Job> {
    sqlx::query_as::<_, Job>(
        "INSERT INTO jobs (tenant_id, credential_id, job_type, payload, status, attempts_made, progress)
         VALUES ($1, $2, $3, $4, 'queued', 0, 0)
         RETURNING *",
    )
    .bind(tenant_id)
    .bind(credential_id)
    .bind(job_type)
    .bind(payload)
    .fetch_one(pool)
    .await
}

pub async fn set_job_broker_id(pool: &PgPool, id: Uuid, broker_id: &str) -> sqlx::Result<()> {
    sqlx::query("UPDATE jobs SET broker_id = $1 WHERE id = $2")
        .bind(broker_id)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn find_job(pool: &PgPool, id: Uuid, tenant_id: Uuid) -> sqlx::Result<Option<Job>> {
    sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1 AND tenant_id = $2")
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
}

/// Find a job by its id alone — used by the event listener, which only has the
/// broker-side correlation id and does not carry tenant context.
pub async fn find_job_by_id(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<Job>> {
    sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_jobs(
    pool: &PgPool,
    tenant_id: Uuid,
    status: Option<JobStatus>,
    limit: i64,
    offset: i64,
) -> sqlx::Result<Vec<Job>> {
    sqlx::query_as::<_, Job>(
        "SELECT * FROM jobs
         WHERE tenant_id = $1 AND ($2::job_status IS NULL OR status = $2)
         ORDER BY created_at DESC
         LIMIT $3 OFFSET $4",
    )
    .bind(tenant_id)
    .bind(status)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Worker-owned transition: QUEUED -> PROCESSING. Only the lease-holding worker
/// writes these columns (§5 shared-resource policy).
pub async fn mark_job_processing(pool: &PgPool, id: Uuid) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE jobs SET status = 'processing', started_at = NOW(), attempts_made = attempts_made + 1
         WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Event-listener-owned transition: terminal COMPLETED state (§4.5, single writer).
pub async fn mark_job_completed(
    pool: &PgPool,
    id: Uuid,
    result: serde_json::Value,
    file_expires_at: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE jobs
         SET status = 'completed', result = $2, completed_at = NOW(), progress = 100,
             file_expires_at = $3
         WHERE id = $1",
    )
    .bind(id)
    .bind(result)
    .bind(file_expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Event-listener-owned transition: terminal FAILED state.
pub async fn mark_job_failed(pool: &PgPool, id: Uuid, error_message: &str) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE jobs SET status = 'failed', error_message = $2, completed_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .bind(error_message)
    .execute(pool)
    .await?;
    Ok(())
}

/// Non-terminal retry bookkeeping: append the error but keep the job QUEUED for
/// the broker's own retry (invariant 3).
pub async fn record_job_retry_error(pool: &PgPool, id: Uuid, error_message: &str) -> sqlx::Result<()> {
    sqlx::query("UPDATE jobs SET status = 'queued', error_message = $2 WHERE id = $1")
        .bind(id)
        .bind(error_message)
        .execute(pool)
        .await?;
    Ok(())
}

/// Progress coalescing: last-value-wins, only moves forward (§9 design note).
pub async fn update_job_progress(pool: &PgPool, id: Uuid, progress: i32) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE jobs SET progress = GREATEST(progress, $2) WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .bind(progress)
    .execute(pool)
    .await?;
    Ok(())
}

/// Ghost-job reaper: QUEUED rows whose broker enqueue never produced any event
/// within the grace period (§4.3, §9 open question resolution).
pub async fn reap_ghost_jobs(pool: &PgPool, grace_secs: i64) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "UPDATE jobs
         SET status = 'failed', error_message = 'reaped: no broker event within grace period',
             completed_at = NOW()
         WHERE status = 'queued'
           AND started_at IS NULL
           AND created_at < NOW() - make_interval(secs => $1)",
    )
    .bind(grace_secs as f64)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete_expired_jobs(pool: &PgPool, older_than_days: i32) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "DELETE FROM jobs
         WHERE completed_at < NOW() - make_interval(days => $1)
           AND (file_expires_at IS NULL OR file_expires_at < NOW())",
    )
    .bind(older_than_days)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

pub async fn insert_schedule(
    pool: &PgPool,
    tenant_id: Uuid,
    job_type: JobType,
    cron_expression: &str,
    payload_template: serde_json::Value,
    next_run_at: DateTime<Utc>,
) -> sqlx::Result<Schedule> {
    sqlx::query_as::<_, Schedule>(
        "INSERT INTO schedules (tenant_id, job_type, cron_expression, payload_template, active, next_run_at)
         VALUES ($1, $2, $3, $4, true, $5)
         RETURNING *",
    )
    .bind(tenant_id)
    .bind(job_type)
    .bind(cron_expression)
    .bind(payload_template)
    .bind(next_run_at)
    .fetch_one(pool)
    .await
}

pub async fn list_schedules(pool: &PgPool, tenant_id: Uuid) -> sqlx::Result<Vec<Schedule>> {
    sqlx::query_as::<_, Schedule>(
        "SELECT * FROM schedules WHERE tenant_id = $1 ORDER BY created_at DESC",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await
}

pub async fn find_schedule(pool: &PgPool, id: Uuid, tenant_id: Uuid) -> sqlx::Result<Option<Schedule>> {
    sqlx::query_as::<_, Schedule>("SELECT * FROM schedules WHERE id = $1 AND tenant_id = $2")
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
}

#[allow(clippy::too_many_arguments)]
pub async fn update_schedule(
    pool: &PgPool,
    id: Uuid,
    tenant_id: Uuid,
    cron_expression: &str,
    payload_template: serde_json::Value,
    next_run_at: DateTime<Utc>,
) -> sqlx::Result<Option<Schedule>> {
    sqlx::query_as::<_, Schedule>(
        "UPDATE schedules
         SET cron_expression = $3, payload_template = $4, next_run_at = $5
         WHERE id = $1 AND tenant_id = $2
         RETURNING *",
    )
    .bind(id)
    .bind(tenant_id)
    .bind(cron_expression)
    .bind(payload_template)
    .bind(next_run_at)
    .fetch_optional(pool)
    .await
}

pub async fn delete_schedule(pool: &PgPool, id: Uuid, tenant_id: Uuid) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM schedules WHERE id = $1 AND tenant_id = $2")
        .bind(id)
        .bind(tenant_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_schedule_active(
    pool: &PgPool,
    id: Uuid,
    tenant_id: Uuid,
    active: bool,
) -> sqlx::Result<bool> {
    let result = sqlx::query("UPDATE schedules SET active = $3 WHERE id = $1 AND tenant_id = $2")
        .bind(id)
        .bind(tenant_id)
        .bind(active)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn due_schedules(pool: &PgPool) -> sqlx::Result<Vec<Schedule>> {
    sqlx::query_as::<_, Schedule>(
        "SELECT * FROM schedules WHERE active = true AND next_run_at <= NOW()",
    )
    .fetch_all(pool)
    .await
}

pub async fn mark_schedule_run(
    pool: &PgPool,
    id: Uuid,
    last_run_at: DateTime<Utc>,
    next_run_at: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE schedules SET last_run_at = $2, next_run_at = $3 WHERE id = $1")
        .bind(id)
        .bind(last_run_at)
        .bind(next_run_at)
        .execute(pool)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Usage records
// ---------------------------------------------------------------------------

/// Idempotent on job id (invariant 4): `ON CONFLICT DO NOTHING` makes a second
/// recording for the same job a silent no-op.
pub async fn record_usage(
    pool: &PgPool,
    job_id: Uuid,
    tenant_id: Uuid,
    row_count: i64,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO usage_records (job_id, tenant_id, row_count, billing_period)
         VALUES ($1, $2, $3, date_trunc('month', NOW()))
         ON CONFLICT (job_id) DO NOTHING",
    )
    .bind(job_id)
    .bind(tenant_id)
    .bind(row_count)
    .execute(pool)
    .await?;
    Ok(())
}

/// Cursor page over a tenant's usage records, ordered by job id (§4.4 source contract).
pub async fn usage_records_page(
    pool: &PgPool,
    tenant_id: Uuid,
    after_job_id: Option<Uuid>,
    limit: i64,
) -> sqlx::Result<Vec<UsageRecord>> {
    sqlx::query_as::<_, UsageRecord>(
        "SELECT * FROM usage_records
         WHERE tenant_id = $1 AND ($2::uuid IS NULL OR job_id > $2)
         ORDER BY job_id ASC
         LIMIT $3",
    )
    .bind(tenant_id)
    .bind(after_job_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Cheap upfront count used only to estimate export progress milestones (§4.4 step 3);
/// never used to decide pagination termination, which relies solely on short pages.
pub async fn count_usage_records(pool: &PgPool, tenant_id: Uuid) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM usage_records WHERE tenant_id = $1")
        .bind(tenant_id)
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

pub async fn monthly_usage_total(pool: &PgPool, tenant_id: Uuid) -> sqlx::Result<i64> {
    let row: (Option<i64>,) = sqlx::query_as(
        "SELECT SUM(row_count) FROM usage_records
         WHERE tenant_id = $1 AND billing_period = date_trunc('month', NOW())",
    )
    .bind(tenant_id)
    .fetch_one(pool)
    .await?;
    Ok(row.0.unwrap_or(0))
}

// ---------------------------------------------------------------------------
// Webhook deliveries
// ---------------------------------------------------------------------------

pub async fn insert_webhook_delivery(
    pool: &PgPool,
    job_id: Uuid,
    tenant_id: Uuid,
    event: WebhookEvent,
    payload: serde_json::Value,
) -> sqlx::Result<WebhookDelivery> {
    sqlx::query_as::<_, WebhookDelivery>(
        "INSERT INTO webhook_deliveries (job_id, tenant_id, event, status, attempts, payload)
         VALUES ($1, $2, $3, 'pending', 0, $4)
         RETURNING *",
    )
    .bind(job_id)
    .bind(tenant_id)
    .bind(event)
    .bind(payload)
    .fetch_one(pool)
    .await
}

pub async fn find_webhook_delivery(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<WebhookDelivery>> {
    sqlx::query_as::<_, WebhookDelivery>("SELECT * FROM webhook_deliveries WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn mark_delivery_attempt(
    pool: &PgPool,
    id: Uuid,
    status: DeliveryStatus,
    http_status: Option<i32>,
    error_message: Option<&str>,
) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE webhook_deliveries
         SET status = $2, attempts = attempts + 1, http_status = $3, error_message = $4,
             updated_at = NOW()
         WHERE id = $1",
    )
    .bind(id)
    .bind(status)
    .bind(http_status)
    .bind(error_message)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_old_webhook_deliveries(pool: &PgPool, older_than_days: i32) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "DELETE FROM webhook_deliveries WHERE created_at < NOW() - make_interval(days => $1)",
    )
    .bind(older_than_days)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// Audit entries (insert-only, see `audit.rs` for the enforced guard)
// ---------------------------------------------------------------------------

pub async fn insert_audit_entry(
    pool: &PgPool,
    tenant_id: Uuid,
    actor: &str,
    action: &str,
    target_type: &str,
    target_id: &str,
    metadata: serde_json::Value,
    ip: Option<&str>,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO audit_entries (tenant_id, actor, action, target_type, target_id, metadata, ip)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(tenant_id)
    .bind(actor)
    .bind(action)
    .bind(target_type)
    .bind(target_id)
    .bind(metadata)
    .bind(ip)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_audit_entries(
    pool: &PgPool,
    tenant_id: Uuid,
    limit: i64,
    offset: i64,
) -> sqlx::Result<Vec<AuditEntry>> {
    sqlx::query_as::<_, AuditEntry>(
        "SELECT * FROM audit_entries WHERE tenant_id = $1
         ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(tenant_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Cursor page over a tenant's audit entries, ordered by id (§4.4 source contract).
pub async fn audit_entries_page(
    pool: &PgPool,
    tenant_id: Uuid,
    after_id: Option<Uuid>,
    limit: i64,
) -> sqlx::Result<Vec<AuditEntry>> {
    sqlx::query_as::<_, AuditEntry>(
        "SELECT * FROM audit_entries
         WHERE tenant_id = $1 AND ($2::uuid IS NULL OR id > $2)
         ORDER BY id ASC
         LIMIT $3",
    )
    .bind(tenant_id)
    .bind(after_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn count_audit_entries(pool: &PgPool, tenant_id: Uuid) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_entries WHERE tenant_id = $1")
        .bind(tenant_id)
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

/// Privileged anonymization bypass used only by tenant erasure (§3 lifecycles, §9).
/// This is the single allowed mutation of the insert-only audit table.
pub async fn anonymize_audit_entries_for_tenant(
    pool: &PgPool,
    tenant_id: Uuid,
    salted_hash: &str,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "UPDATE audit_entries
         SET actor = $2, ip = NULL, metadata = '{}'::jsonb
         WHERE tenant_id = $1",
    )
    .bind(tenant_id)
    .bind(salted_hash)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete_old_audit_entries(pool: &PgPool, older_than_days: i32) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "DELETE FROM audit_entries WHERE created_at < NOW() - make_interval(days => $1)",
    )
    .bind(older_than_days)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
