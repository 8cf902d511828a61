//! ExportKit: multi-tenant asynchronous data-export service.

pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod email;
pub mod export;
pub mod health;
pub mod jobs;
pub mod notifications;
pub mod ratelimit;
pub mod retention;
pub mod s3;
pub mod schedule;
pub mod shutdown;
pub mod usage;
pub mod util;
pub mod webhooks;
pub mod worker;
