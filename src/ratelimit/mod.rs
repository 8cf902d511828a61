//! Rate limiting and loop-guard module (§4.2).
//!
//! Two independent sliding windows (sustained, burst) per credential per tier,
//! plus a job-creation-only loop guard, all backed by Redis atomic counters.

pub mod config;
pub mod constants;
pub mod error;
pub mod ip;
pub mod limiter;
pub mod middleware;
pub mod types;

pub use config::*;
pub use constants::*;
pub use error::*;
pub use ip::*;
pub use limiter::*;
pub use middleware::{rate_limit_by_credential, with_category};
pub use types::*;
