//! Job lifecycle events published on the broker event bus (§4.5, §5).
//!
//! The lease-holding export worker ([`super::pool`]) and the terminal-state
//! listener ([`super::listener`]) are independent tasks that only talk to
//! each other through this pub/sub channel, mirroring the disjoint-ownership
//! model in §5: the worker writes PROCESSING/started-at/attempts-made, the
//! listener is the sole writer of COMPLETED/FAILED.

use anyhow::Result;
use fred::interfaces::PubsubInterface;
use fred::prelude::RedisClient;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::export::ExportOutcome;

pub const JOB_EVENTS_CHANNEL: &str = "jobs:events";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Progress {
        job_id: Uuid,
        percent: u32,
    },
    Completed {
        job_id: Uuid,
        tenant_id: Uuid,
        outcome: ExportOutcome,
    },
    /// Terminal failure only: attempts-remaining retries are handled by the
    /// worker pool itself and never reach the bus (§4.4, §4.5).
    Failed {
        job_id: Uuid,
        tenant_id: Uuid,
        error: String,
    },
}

pub async fn publish(redis: &RedisClient, event: &JobEvent) -> Result<()> {
    let payload = serde_json::to_string(event)?;
    redis.publish::<(), _, _>(JOB_EVENTS_CHANNEL, payload).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::JobType;

    #[test]
    fn job_event_round_trips_through_json() {
        let event = JobEvent::Completed {
            job_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            outcome: ExportOutcome {
                object_key: "exports/t/j.csv".into(),
                byte_size: 1024,
                row_count: 10,
                format: JobType::Csv,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: JobEvent = serde_json::from_str(&json).unwrap();
        match parsed {
            JobEvent::Completed { outcome, .. } => assert_eq!(outcome.row_count, 10),
            _ => panic!("expected Completed variant"),
        }
    }

    #[test]
    fn progress_event_tag_is_snake_case() {
        let event = JobEvent::Progress {
            job_id: Uuid::new_v4(),
            percent: 50,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"progress\""));
    }
}
