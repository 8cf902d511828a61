//! Export worker pool (§4.5, §5): leases jobs off the priority queue, drives
//! the export engine, and owns retry/backoff for non-terminal failures.
//!
//! Grounded on the teacher's `webhooks::delivery::spawn_delivery_worker`
//! BRPOP-loop-plus-spawned-task shape, generalized from a single queue to
//! the three-tier priority queue in [`super::queue`].

use std::sync::Arc;
use std::time::Duration;

use fred::prelude::RedisClient;
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db::{self, Job};
use crate::export;
use crate::s3::S3Client;

use super::events::{self, JobEvent};
use super::queue;

/// Exponential backoff delays for non-terminal retries (§4.4): 1s, 2s, 4s.
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// Spawn `concurrency` worker tasks, each independently polling the queue.
pub fn spawn(
    pool: PgPool,
    redis: RedisClient,
    s3: S3Client,
    config: Arc<Config>,
    concurrency: usize,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..concurrency)
        .map(|worker_index| {
            let pool = pool.clone();
            let redis = redis.clone();
            let s3 = s3.clone();
            let config = config.clone();
            tokio::spawn(async move {
                info!(worker_index, "export worker started");
                run_worker_loop(pool, redis, s3, config).await;
            })
        })
        .collect()
}

async fn run_worker_loop(pool: PgPool, redis: RedisClient, s3: S3Client, config: Arc<Config>) {
    loop {
        let job_id = match queue::dequeue(&redis, 5.0).await {
            Ok(Some(id)) => id,
            Ok(None) => continue,
            Err(e) => {
                error!(error = %e, "failed to dequeue export job");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        if let Err(e) = process_one(&pool, &redis, &s3, &config, job_id).await {
            error!(job_id = %job_id, error = %e, "export job processing aborted unexpectedly");
        }
    }
}

async fn process_one(
    pool: &PgPool,
    redis: &RedisClient,
    s3: &S3Client,
    config: &Config,
    job_id: Uuid,
) -> anyhow::Result<()> {
    let Some(job) = db::find_job_by_id(pool, job_id).await? else {
        warn!(job_id = %job_id, "dequeued job id has no matching row; dropping");
        return Ok(());
    };

    // Ghost rows reaped by the schedule engine's sweep may have already
    // terminated this job by the time it's dequeued.
    if job.status != db::JobStatus::Queued {
        return Ok(());
    }

    db::mark_job_processing(pool, job.id).await?;

    let job_id = job.id;
    let tenant_id = job.tenant_id;
    let redis_for_progress = redis.clone();

    let run_result = export::run(
        pool,
        s3,
        tenant_id,
        job_id,
        job.job_type,
        &job.payload,
        config.export_batch_size,
        |percent| {
            let redis = redis_for_progress.clone();
            tokio::spawn(async move {
                let event = JobEvent::Progress { job_id, percent };
                if let Err(e) = events::publish(&redis, &event).await {
                    warn!(job_id = %job_id, error = %e, "failed to publish progress event");
                }
            });
        },
    )
    .await;

    match run_result {
        Ok(outcome) => {
            let event = JobEvent::Completed {
                job_id,
                tenant_id,
                outcome,
            };
            events::publish(redis, &event).await?;
        }
        Err(error) => handle_failure(pool, redis, config, &job, &error.to_string()).await?,
    }

    Ok(())
}

async fn handle_failure(
    pool: &PgPool,
    redis: &RedisClient,
    config: &Config,
    job: &Job,
    error: &str,
) -> anyhow::Result<()> {
    let attempts_made = job.attempts_made.max(1) as u32;

    if attempts_made < config.job_max_attempts {
        db::record_job_retry_error(pool, job.id, error).await?;

        let delay_index = (attempts_made - 1) as usize;
        let delay = RETRY_DELAYS
            .get(delay_index)
            .copied()
            .unwrap_or(*RETRY_DELAYS.last().unwrap());

        let tenant = db::find_tenant(pool, job.tenant_id).await?;
        let priority = tenant.map(|t| t.plan_tier.priority()).unwrap_or(10);
        let redis = redis.clone();
        let job_id = job.id;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = queue::enqueue(&redis, priority, job_id).await {
                error!(job_id = %job_id, error = %e, "failed to re-enqueue retried export job");
            }
        });

        return Ok(());
    }

    let event = JobEvent::Failed {
        job_id: job.id,
        tenant_id: job.tenant_id,
        error: error.to_string(),
    };
    events::publish(redis, &event).await?;
    Ok(())
}
