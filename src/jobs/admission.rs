//! Job admission (§4.3): write the Job row, then enqueue on the export broker.
//!
//! The two steps are intentionally not transactional. A row that's written
//! but never produces a broker event ("ghost row") is tolerated and reaped
//! by [`crate::schedule::engine`]'s periodic sweep rather than guarded
//! against here.

use anyhow::Result;
use fred::prelude::RedisClient;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{self, Job, JobType};
use crate::worker::queue;

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("tenant not found")]
    TenantNotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Broker(#[from] anyhow::Error),
}

/// Create and enqueue a job for a tenant. `credential_id` is `None` for
/// schedule- or system-originated jobs (§4.8 admits minus credential checks).
pub async fn admit_job(
    pool: &PgPool,
    redis: &RedisClient,
    tenant_id: Uuid,
    credential_id: Option<Uuid>,
    job_type: JobType,
    payload: Value,
) -> Result<Job, AdmissionError> {
    let tenant = db::find_tenant(pool, tenant_id)
        .await?
        .ok_or(AdmissionError::TenantNotFound)?;

    let job = db::insert_job(pool, tenant_id, credential_id, job_type, payload).await?;
    db::set_job_broker_id(pool, job.id, &job.id.to_string()).await?;

    queue::enqueue(redis, tenant.plan_tier.priority(), job.id).await?;

    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_error_messages_are_stable() {
        assert_eq!(AdmissionError::TenantNotFound.to_string(), "tenant not found");
    }
}
