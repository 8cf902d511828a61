//! Entry point for handing a terminal job event off to the delivery queue (§4.6).
//!
//! Called by the worker pool's event listener once a job reaches `COMPLETED`
//! or `FAILED`. Writes the `PENDING` delivery row before enqueueing, so a
//! crash between the two leaves a row the retention engine can still see
//! rather than a delivery attempt nothing recorded.

use fred::prelude::RedisClient;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{self, Tenant, WebhookEvent};

use super::delivery;
use super::types::WebhookDeliveryItem;

pub async fn dispatch_export_completed(
    pool: &PgPool,
    redis: &RedisClient,
    tenant: &Tenant,
    job_id: Uuid,
    payload: serde_json::Value,
) -> anyhow::Result<()> {
    dispatch(pool, redis, tenant, job_id, WebhookEvent::ExportCompleted, payload).await
}

pub async fn dispatch_export_failed(
    pool: &PgPool,
    redis: &RedisClient,
    tenant: &Tenant,
    job_id: Uuid,
    payload: serde_json::Value,
) -> anyhow::Result<()> {
    dispatch(pool, redis, tenant, job_id, WebhookEvent::ExportFailed, payload).await
}

async fn dispatch(
    pool: &PgPool,
    redis: &RedisClient,
    tenant: &Tenant,
    job_id: Uuid,
    event: WebhookEvent,
    payload: serde_json::Value,
) -> anyhow::Result<()> {
    if !tenant.webhook_active || tenant.webhook_url.is_none() {
        return Ok(());
    }
    if db::webhook_circuit_open(tenant) {
        return Ok(());
    }

    let delivery_row = db::insert_webhook_delivery(pool, job_id, tenant.id, event, payload.clone()).await?;

    let item = WebhookDeliveryItem {
        delivery_id: delivery_row.id,
        tenant_id: tenant.id,
        job_id,
        event,
        payload,
        attempt: 0,
    };
    delivery::enqueue(redis, &item).await?;
    Ok(())
}
