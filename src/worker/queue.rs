//! Priority export queue on top of three Redis lists.
//!
//! One list per priority tier; `BRPOP` checks the keys in the order given and
//! returns from the first non-empty one, so listing tiers high-priority-first
//! gives strict priority without a sorted-set polling loop.

use anyhow::Result;
use fred::interfaces::{KeysInterface, ListInterface};
use fred::prelude::RedisClient;
use uuid::Uuid;

use crate::db::PlanTier;

fn queue_key(priority: i32) -> String {
    format!("jobs:queue:{priority}")
}

/// All tier keys, ordered highest-priority first, for use with `BRPOP`.
fn all_keys() -> Vec<String> {
    let mut priorities: Vec<i32> = vec![
        PlanTier::Scale.priority(),
        PlanTier::Pro.priority(),
        PlanTier::Free.priority(),
    ];
    priorities.sort_unstable();
    priorities.into_iter().map(queue_key).collect()
}

pub async fn enqueue(redis: &RedisClient, priority: i32, job_id: Uuid) -> Result<()> {
    redis
        .lpush::<(), _, _>(queue_key(priority), job_id.to_string())
        .await?;
    Ok(())
}

/// Block up to `timeout_secs` waiting for the next job, highest priority first.
pub async fn dequeue(redis: &RedisClient, timeout_secs: f64) -> Result<Option<Uuid>> {
    let keys = all_keys();
    let result: Option<(String, String)> = redis.brpop(keys, timeout_secs).await?;
    match result {
        Some((_key, value)) => Ok(Some(Uuid::parse_str(&value)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_keys_orders_scale_before_free() {
        let keys = all_keys();
        assert_eq!(keys.first().unwrap(), "jobs:queue:1");
        assert_eq!(keys.last().unwrap(), "jobs:queue:10");
    }

    #[test]
    fn queue_key_is_stable_per_priority() {
        assert_eq!(queue_key(5), "jobs:queue:5");
    }
}
