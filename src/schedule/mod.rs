//! Cron-driven schedule materializer (§4.8).

pub mod cron;
pub mod engine;

pub use cron::{validate as validate_cron, CronError};
