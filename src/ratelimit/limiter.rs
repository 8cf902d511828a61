//! Core rate limiter and loop guard, backed by Redis atomic counters.

use fred::prelude::*;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ratelimit::{LimitConfig, RateLimitCategory, RateLimitConfig, RateLimitError, RateLimitResult};

/// Embedded Lua script for atomic rate-limit check and increment.
const RATE_LIMIT_SCRIPT: &str = include_str!("rate_limit.lua");

/// Rate limiter and loop guard service backed by Redis.
#[derive(Clone)]
pub struct RateLimiter {
    redis: RedisClient,
    config: Arc<RateLimitConfig>,
    script_sha: String,
}

impl RateLimiter {
    /// Create a new rate limiter. Call [`Self::init`] before use.
    pub fn new(redis: RedisClient, config: RateLimitConfig) -> Self {
        Self {
            redis,
            config: Arc::new(config),
            script_sha: String::new(),
        }
    }

    /// Load the Lua script into Redis.
    pub async fn init(&mut self) -> Result<(), RedisError> {
        let sha: String = self.redis.script_load(RATE_LIMIT_SCRIPT).await?;
        debug!(script_sha = %sha, "rate limit Lua script loaded");
        self.script_sha = sha;
        Ok(())
    }

    /// Check both the sustained and burst windows for `category`/`identifier` (§4.2).
    /// Both must pass; the more restrictive result is returned.
    #[tracing::instrument(skip(self), fields(category = %category.as_str()))]
    pub async fn check(
        &self,
        category: RateLimitCategory,
        identifier: &str,
    ) -> Result<RateLimitResult, RateLimitError> {
        if self.config.allowlist.contains(identifier) {
            debug!(identifier, "allowlisted, bypassing rate limit");
            return Ok(RateLimitResult {
                allowed: true,
                limit: 0,
                remaining: 0,
                reset_at: 0,
                retry_after: 0,
            });
        }

        let sustained_config = *self.config.get(category);
        let burst_config = sustained_config.burst();

        let sustained = self
            .check_window(category.as_str(), identifier, sustained_config)
            .await?;
        let burst = self
            .check_window(category.as_str(), identifier, burst_config)
            .await?;

        if !sustained.allowed {
            return Ok(sustained);
        }
        if !burst.allowed {
            return Ok(burst);
        }
        Ok(sustained)
    }

    async fn check_window(
        &self,
        category: &str,
        identifier: &str,
        window: LimitConfig,
    ) -> Result<RateLimitResult, RateLimitError> {
        let key = format!(
            "{}:{}:{}:{}s",
            self.config.redis_key_prefix, category, identifier, window.window_secs
        );

        let result: Vec<i64> = self
            .redis
            .evalsha(
                &self.script_sha,
                vec![key.as_str()],
                vec![window.window_secs.to_string(), window.requests.to_string()],
            )
            .await
            .map_err(|e| {
                warn!(error = %e, "redis rate limit check failed");
                RateLimitError::RedisUnavailable
            })?;

        let count = result[0] as u32;
        let allowed = result[1] == 1;
        let ttl = result[2].max(0) as u64;
        let now = unix_now();

        Ok(RateLimitResult {
            allowed,
            limit: window.requests,
            remaining: if allowed {
                window.requests.saturating_sub(count)
            } else {
                0
            },
            reset_at: now + ttl,
            retry_after: if allowed { 0 } else { ttl },
        })
    }

    /// Loop guard (§4.2): per-(credential, payload-hash) counter, job-creation only.
    /// Fails open (allows, logs) on Redis unavailability.
    #[tracing::instrument(skip(self, payload))]
    pub async fn check_loop_guard(
        &self,
        credential_id: &str,
        payload: &serde_json::Value,
    ) -> Result<(), RateLimitError> {
        let payload_hash = hash_payload(payload);
        let key = format!(
            "{}:loop_guard:{}:{}",
            self.config.redis_key_prefix, credential_id, payload_hash
        );

        let result: Result<Vec<i64>, RedisError> = self
            .redis
            .evalsha(
                &self.script_sha,
                vec![key.as_str()],
                vec![
                    self.config.loop_guard.window_secs.to_string(),
                    self.config.loop_guard.threshold.to_string(),
                ],
            )
            .await;

        let result = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "redis unavailable for loop guard, failing open");
                return Ok(());
            }
        };

        let allowed = result[1] == 1;
        let ttl = result[2].max(0) as u64;

        if !allowed {
            warn!(credential_id, payload_hash, "loop guard tripped");
            return Err(RateLimitError::LoopGuardTripped { retry_after: ttl });
        }

        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

/// Stable hash of the normalized request payload for loop-guard keying.
/// Serde's `to_string` on a `serde_json::Value` already produces a canonical
/// key order for objects parsed from JSON text, which is sufficient here: the
/// guard only needs to recognize *byte-identical resubmission*, not semantic
/// equivalence across differently-ordered keys.
fn hash_payload(payload: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_payload_is_deterministic() {
        let payload = serde_json::json!({"format": "csv", "query": "all"});
        assert_eq!(hash_payload(&payload), hash_payload(&payload));
    }

    #[test]
    fn hash_payload_differs_for_different_payloads() {
        let a = serde_json::json!({"format": "csv"});
        let b = serde_json::json!({"format": "json"});
        assert_ne!(hash_payload(&a), hash_payload(&b));
    }
}
