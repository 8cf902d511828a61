//! Usage accounting facade (§3, §4.7).
//!
//! Thin wrapper over the idempotent usage-record insert and monthly totals,
//! plus a marketing usage-alert threshold check evaluated after each
//! successful export.

use sqlx::PgPool;
use uuid::Uuid;

use crate::db;

/// Re-read monthly totals against these thresholds after recording usage; the
/// first threshold crossed in a billing period triggers one usage-alert email.
const ALERT_THRESHOLDS: [i64; 3] = [10_000, 100_000, 1_000_000];

pub async fn record(pool: &PgPool, job_id: Uuid, tenant_id: Uuid, row_count: i64) -> sqlx::Result<()> {
    db::record_usage(pool, job_id, tenant_id, row_count).await
}

pub async fn monthly_total(pool: &PgPool, tenant_id: Uuid) -> sqlx::Result<i64> {
    db::monthly_usage_total(pool, tenant_id).await
}

/// Returns the threshold just crossed by adding `row_count` to the total the
/// tenant had before this job, or `None` if no threshold was crossed.
#[must_use]
pub fn threshold_crossed(total_before: i64, row_count: i64) -> Option<i64> {
    let total_after = total_before + row_count;
    ALERT_THRESHOLDS
        .into_iter()
        .find(|&threshold| total_before < threshold && total_after >= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_first_threshold_crossing() {
        assert_eq!(threshold_crossed(9_000, 2_000), Some(10_000));
    }

    #[test]
    fn no_crossing_when_already_past_all_thresholds() {
        assert_eq!(threshold_crossed(2_000_000, 500), None);
    }

    #[test]
    fn no_crossing_when_staying_below_next_threshold() {
        assert_eq!(threshold_crossed(1_000, 500), None);
    }
}
