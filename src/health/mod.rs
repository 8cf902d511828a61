//! Dependency health probing (§4.10).
//!
//! Grounded on the teacher's `api::health_check` (parallel DB + Redis
//! reachability, degraded/ok envelope), extended with an S3 reachability
//! probe and per-dependency latency, each bounded by its own 3-second
//! deadline under an overall 5-second budget so one slow dependency cannot
//! stall the whole check.

use std::time::{Duration, Instant};

use fred::interfaces::ClientLike;
use fred::prelude::RedisClient;
use serde::Serialize;
use sqlx::PgPool;

use crate::s3::S3Client;

const PER_DEPENDENCY_DEADLINE: Duration = Duration::from_secs(3);
const OVERALL_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct DependencyStatus {
    pub ok: bool,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: DependencyStatus,
    pub redis: DependencyStatus,
    pub object_storage: DependencyStatus,
}

/// Probes all three dependencies concurrently, unauthenticated, never cached.
pub async fn check(pool: &PgPool, redis: &RedisClient, s3: &S3Client) -> HealthReport {
    let overall = tokio::time::timeout(OVERALL_DEADLINE, async {
        tokio::join!(
            probe(probe_database(pool)),
            probe(probe_redis(redis)),
            probe(probe_object_storage(s3)),
        )
    })
    .await;

    let (database, redis_status, object_storage) = overall.unwrap_or((
        DependencyStatus {
            ok: false,
            latency_ms: OVERALL_DEADLINE.as_millis() as u64,
        },
        DependencyStatus {
            ok: false,
            latency_ms: OVERALL_DEADLINE.as_millis() as u64,
        },
        DependencyStatus {
            ok: false,
            latency_ms: OVERALL_DEADLINE.as_millis() as u64,
        },
    ));

    let status = if database.ok && redis_status.ok && object_storage.ok {
        "ok"
    } else {
        "degraded"
    };

    HealthReport {
        status,
        database,
        redis: redis_status,
        object_storage,
    }
}

async fn probe<F>(fut: F) -> DependencyStatus
where
    F: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    let ok = tokio::time::timeout(PER_DEPENDENCY_DEADLINE, fut)
        .await
        .unwrap_or(false);
    DependencyStatus {
        ok,
        latency_ms: start.elapsed().as_millis() as u64,
    }
}

async fn probe_database(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").fetch_one(pool).await.is_ok()
}

async fn probe_redis(redis: &RedisClient) -> bool {
    redis.ping::<String>(None).await.is_ok()
}

async fn probe_object_storage(s3: &S3Client) -> bool {
    s3.list_one().await.is_ok()
}
