//! Rate limiting configuration.

use std::collections::HashSet;

use super::types::RateLimitCategory;
use crate::config::Config;

/// Configuration for the rate limiting system, derived from server [`Config`].
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Redis key prefix.
    pub redis_key_prefix: String,
    /// Allow requests through when Redis is unreachable.
    pub fail_open: bool,
    /// Trust `X-Forwarded-For` / `X-Real-IP`.
    pub trust_proxy: bool,
    /// Identifiers (credential id or normalized IP) that bypass rate limiting entirely.
    pub allowlist: HashSet<String>,
    /// Per-tier sustained limits.
    pub limits: RateLimits,
    /// Loop-guard (runaway-agent) configuration.
    pub loop_guard: LoopGuardConfig,
}

/// Sustained per-60s ceilings per tier (§4.2). The burst window is always
/// 2x the sustained ceiling evaluated over a 10s window — it is not separately
/// configurable, per spec.
#[derive(Debug, Clone)]
pub struct RateLimits {
    pub export_creation: LimitConfig,
    pub download: LimitConfig,
    pub general: LimitConfig,
}

/// A single window's ceiling.
#[derive(Debug, Clone, Copy)]
pub struct LimitConfig {
    pub requests: u32,
    pub window_secs: u64,
}

impl LimitConfig {
    /// The burst window derived from a sustained window: 2x the requests, 10s.
    #[must_use]
    pub const fn burst(self) -> Self {
        Self {
            requests: self.requests.saturating_mul(2),
            window_secs: 10,
        }
    }
}

/// Loop guard: per-(credential, payload-hash) counter on job creation only.
#[derive(Debug, Clone, Copy)]
pub struct LoopGuardConfig {
    pub threshold: u32,
    pub window_secs: u64,
}

impl RateLimitConfig {
    /// Build rate-limit configuration from the server's loaded [`Config`].
    #[must_use]
    pub fn from_server_config(config: &Config) -> Self {
        Self {
            redis_key_prefix: "exportkit:rl".to_string(),
            fail_open: config.rate_limit_fail_open,
            trust_proxy: config.trust_proxy,
            allowlist: HashSet::new(),
            limits: RateLimits {
                export_creation: LimitConfig {
                    requests: config.rate_limit_export_creation,
                    window_secs: 60,
                },
                download: LimitConfig {
                    requests: config.rate_limit_download,
                    window_secs: 60,
                },
                general: LimitConfig {
                    requests: config.rate_limit_general,
                    window_secs: 60,
                },
            },
            loop_guard: LoopGuardConfig {
                threshold: config.loop_guard_threshold,
                window_secs: config.loop_guard_window_secs,
            },
        }
    }
}

impl RateLimitConfig {
    /// Returns the sustained-window limit configuration for a given tier.
    #[must_use]
    pub const fn get(&self, category: RateLimitCategory) -> &LimitConfig {
        match category {
            RateLimitCategory::ExportCreation => &self.limits.export_creation,
            RateLimitCategory::Download => &self.limits.download,
            RateLimitCategory::General => &self.limits.general,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_is_double_sustained_over_ten_seconds() {
        let sustained = LimitConfig {
            requests: 10,
            window_secs: 60,
        };
        let burst = sustained.burst();
        assert_eq!(burst.requests, 20);
        assert_eq!(burst.window_secs, 10);
    }

    #[test]
    fn from_server_config_maps_tiers() {
        let server_config = Config::default_for_test();
        let rl_config = RateLimitConfig::from_server_config(&server_config);
        assert_eq!(rl_config.limits.export_creation.requests, 10);
        assert_eq!(rl_config.limits.download.requests, 30);
        assert_eq!(rl_config.limits.general.requests, 100);
    }
}
