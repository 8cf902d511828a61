//! Webhook delivery queue item and error types (§4.6).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::WebhookEvent;

/// Item queued for delivery via Redis. The signing secret is looked up from
/// the database at delivery time rather than carried in the queue payload,
/// so it never sits in Redis longer than a single delivery attempt's memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDeliveryItem {
    pub delivery_id: Uuid,
    pub tenant_id: Uuid,
    pub job_id: Uuid,
    pub event: WebhookEvent,
    pub payload: serde_json::Value,
    pub attempt: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Redis(#[from] fred::error::RedisError),
    #[error("circuit breaker open for tenant")]
    CircuitOpen,
}
