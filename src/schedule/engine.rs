//! Schedule materializer (§4.8): every 60 seconds, turns due schedules into
//! enqueued jobs, single-concurrency so no schedule is ever double-fired by
//! overlapping ticks.
//!
//! Piggybacks the ghost-job reaper sweep on the same tick (§4.3, §9 open
//! question resolution) rather than running a third always-on loop.

use std::sync::Arc;
use std::time::Duration;

use fred::prelude::RedisClient;
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::{self, Schedule};
use crate::jobs;

use super::cron;

const TICK_INTERVAL: Duration = Duration::from_secs(60);

pub fn spawn(pool: PgPool, redis: RedisClient, config: Arc<Config>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("schedule engine started");
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        loop {
            ticker.tick().await;
            run_tick(&pool, &redis, &config).await;
        }
    })
}

async fn run_tick(pool: &PgPool, redis: &RedisClient, config: &Config) {
    match db::reap_ghost_jobs(pool, config.job_reap_grace_secs).await {
        Ok(0) => {}
        Ok(n) => info!(reaped = n, "reaped ghost job rows"),
        Err(e) => error!(error = %e, "ghost job reap failed"),
    }

    let due = match db::due_schedules(pool).await {
        Ok(schedules) => schedules,
        Err(e) => {
            error!(error = %e, "failed to query due schedules");
            return;
        }
    };

    for schedule in due {
        if let Err(e) = fire_schedule(pool, redis, &schedule).await {
            error!(schedule_id = %schedule.id, error = %e, "failed to fire schedule; continuing with siblings");
        }
    }
}

async fn fire_schedule(pool: &PgPool, redis: &RedisClient, schedule: &Schedule) -> anyhow::Result<()> {
    // Admission minus credential checks: scheduled exports never carry a credential.
    jobs::admit_job(
        pool,
        redis,
        schedule.tenant_id,
        None,
        schedule.job_type,
        schedule.payload_template.clone(),
    )
    .await?;

    let now = chrono::Utc::now();
    match cron::next_run_after(&schedule.cron_expression, now) {
        Ok(next_run_at) => {
            db::mark_schedule_run(pool, schedule.id, now, next_run_at).await?;
        }
        Err(e) => {
            warn!(schedule_id = %schedule.id, error = %e, "could not compute next run; leaving schedule due");
        }
    }
    Ok(())
}
