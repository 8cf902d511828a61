//! Independent event-bus subscriber and sole terminal-state writer (§4.5, §5).
//!
//! Subscribes to [`super::events::JOB_EVENTS_CHANNEL`] and is the only code
//! path that ever writes a job's `COMPLETED`/`FAILED` status or progress
//! column, keeping it disjoint from the worker pool's `PROCESSING` /
//! attempts-made writes. All fan-out from a terminal event (webhook,
//! email) is best-effort and never feeds back into the job's own status.

use std::sync::Arc;

use fred::interfaces::PubsubInterface;
use fred::prelude::RedisClient;
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db;
use crate::email::EmailService;
use crate::s3::S3Client;
use crate::webhooks;

use super::events::JobEvent;

pub fn spawn(
    pool: PgPool,
    redis: RedisClient,
    s3: S3Client,
    email: Option<Arc<EmailService>>,
    config: Arc<Config>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("job event listener started");
        if let Err(e) = run(pool, redis, s3, email, config).await {
            error!(error = %e, "job event listener exited");
        }
    })
}

async fn run(
    pool: PgPool,
    redis: RedisClient,
    s3: S3Client,
    email: Option<Arc<EmailService>>,
    config: Arc<Config>,
) -> anyhow::Result<()> {
    let subscriber = redis.clone_new();
    let _connect_handle = subscriber.connect();
    subscriber.wait_for_connect().await?;

    let mut message_rx = subscriber.message_rx();
    subscriber.subscribe(super::events::JOB_EVENTS_CHANNEL).await?;

    while let Ok(message) = message_rx.recv().await {
        let Some(raw) = message.value.as_bytes() else {
            warn!("job event payload was not bytes");
            continue;
        };
        let payload = match std::str::from_utf8(raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "job event payload was not valid UTF-8");
                continue;
            }
        };
        let event: JobEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "failed to deserialize job event");
                continue;
            }
        };
        if let Err(e) = handle_event(&pool, &redis, &s3, email.as_deref(), &config, event).await {
            error!(error = %e, "failed to handle job event");
        }
    }
    Ok(())
}

async fn handle_event(
    pool: &PgPool,
    redis: &RedisClient,
    s3: &S3Client,
    email: Option<&EmailService>,
    config: &Config,
    event: JobEvent,
) -> anyhow::Result<()> {
    match event {
        JobEvent::Progress { job_id, percent } => {
            db::update_job_progress(pool, job_id, percent as i32).await?;
        }
        JobEvent::Completed {
            job_id,
            tenant_id,
            outcome,
        } => {
            let Some(tenant) = db::find_tenant(pool, tenant_id).await? else {
                warn!(tenant_id = %tenant_id, "completed job for unknown tenant");
                return Ok(());
            };

            let retention_days = tenant.retention_days.unwrap_or(config.default_retention_days);
            let file_expires_at = chrono::Utc::now() + chrono::Duration::days(retention_days);

            let result = serde_json::json!({
                "object_key": outcome.object_key,
                "byte_size": outcome.byte_size,
                "row_count": outcome.row_count,
                "format": outcome.format,
            });
            db::mark_job_completed(pool, job_id, result, file_expires_at).await?;

            let total_before = crate::usage::monthly_total(pool, tenant_id).await.unwrap_or(0);
            crate::usage::record(pool, job_id, tenant_id, outcome.row_count).await?;

            let webhook_payload = serde_json::json!({
                "event": "export.completed",
                "job_id": job_id,
                "object_key": outcome.object_key,
                "byte_size": outcome.byte_size,
                "row_count": outcome.row_count,
                "format": outcome.format,
            });
            if let Err(e) =
                webhooks::dispatch_export_completed(pool, redis, &tenant, job_id, webhook_payload).await
            {
                warn!(job_id = %job_id, error = %e, "failed to dispatch completion webhook");
            }

            if let Some(email) = email {
                match s3.presign_get_long(&outcome.object_key).await {
                    Ok(download_url) => {
                        if let Err(e) = crate::notifications::notify_export_completed(
                            email, pool, tenant_id, &download_url,
                        )
                        .await
                        {
                            warn!(job_id = %job_id, error = %e, "failed to send completion email");
                        }
                    }
                    Err(e) => warn!(job_id = %job_id, error = %e, "failed to presign export download URL"),
                }

                if tenant.pre_deletion_notice_consent {
                    spawn_pre_deletion_reminder(pool.clone(), email_arc_clone(email), tenant_id, job_id, retention_days);
                }

                if crate::usage::threshold_crossed(total_before, outcome.row_count).is_some() {
                    if let Err(e) = crate::notifications::notify_usage_alert(
                        email,
                        pool,
                        tenant_id,
                        total_before + outcome.row_count,
                    )
                    .await
                    {
                        warn!(tenant_id = %tenant_id, error = %e, "failed to send usage alert email");
                    }
                }
            }
        }
        JobEvent::Failed {
            job_id,
            tenant_id,
            error: error_message,
        } => {
            let Some(tenant) = db::find_tenant(pool, tenant_id).await? else {
                warn!(tenant_id = %tenant_id, "failed job for unknown tenant");
                return Ok(());
            };

            db::mark_job_failed(pool, job_id, &error_message).await?;

            let webhook_payload = serde_json::json!({
                "event": "export.failed",
                "job_id": job_id,
                "error": error_message,
            });
            if let Err(e) =
                webhooks::dispatch_export_failed(pool, redis, &tenant, job_id, webhook_payload).await
            {
                warn!(job_id = %job_id, error = %e, "failed to dispatch failure webhook");
            }

            if let Some(email) = email {
                if let Err(e) =
                    crate::notifications::notify_export_failed(email, pool, tenant_id, &error_message).await
                {
                    warn!(job_id = %job_id, error = %e, "failed to send failure email");
                }
            }
        }
    }
    Ok(())
}

/// `notify` functions take `&EmailService`; this exists only to hand an owned
/// clone into the spawned reminder task below without fighting lifetimes.
fn email_arc_clone(email: &EmailService) -> EmailService {
    email.clone()
}

/// Best-effort in-process delayed reminder (§4.7). Acceptably lost on restart:
/// all notification fan-out from a terminal event is non-fatal and non-durable.
fn spawn_pre_deletion_reminder(
    pool: PgPool,
    email: EmailService,
    tenant_id: uuid::Uuid,
    job_id: uuid::Uuid,
    retention_days: i64,
) {
    // Fire one day before the file's retention window closes, never sooner than now.
    let delay_days = (retention_days - 1).max(0);
    let delay = std::time::Duration::from_secs(delay_days as u64 * 86_400);

    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) =
            crate::notifications::notify_pre_deletion_reminder(&email, &pool, tenant_id, job_id).await
        {
            warn!(job_id = %job_id, error = %e, "failed to send pre-deletion reminder email");
        }
    });
}
