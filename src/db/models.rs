//! Database models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A customer account that owns jobs, credentials, schedules, and a webhook target.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    /// Contact email for transactional/marketing notifications.
    pub email: String,
    /// Whether transactional emails (completion, failure, deletion confirmation) are enabled.
    pub transactional_consent: bool,
    /// Whether marketing emails (usage alerts) are enabled.
    pub marketing_consent: bool,
    /// Whether the tenant wants a reminder email before an export file expires.
    pub pre_deletion_notice_consent: bool,
    /// Branding: accent color (hex).
    pub brand_color: Option<String>,
    /// Branding: logo URL.
    pub brand_logo_url: Option<String>,
    /// Branding: footer text for emails.
    pub brand_footer: Option<String>,
    /// Per-tenant override of the default export-file retention window, in days.
    pub retention_days: Option<i64>,
    /// Outbound webhook target URL.
    pub webhook_url: Option<String>,
    /// HMAC signing secret for outbound webhooks.
    pub webhook_secret: Option<String>,
    /// Whether the webhook target is active.
    pub webhook_active: bool,
    /// Consecutive webhook-delivery failures (circuit-breaker state, invariant 6).
    pub webhook_consecutive_failures: i32,
    /// Timestamp of the last successful webhook delivery.
    pub webhook_last_success_at: Option<DateTime<Utc>>,
    /// Plan tier, drives job priority (§4.3).
    pub plan_tier: PlanTier,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Plan tier; maps to export-job broker priority (lower = higher priority).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "plan_tier", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Scale,
    Pro,
    Free,
}

impl PlanTier {
    /// Broker-side priority for this tier (lower number = higher priority).
    #[must_use]
    pub const fn priority(self) -> i32 {
        match self {
            Self::Scale => 1,
            Self::Pro => 5,
            Self::Free => 10,
        }
    }
}

/// Credential scope, coarse capability level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "credential_scope", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CredentialScope {
    Read,
    Write,
    Admin,
}

/// A tenant-scoped authentication secret.
#[derive(Debug, Clone, FromRow)]
pub struct Credential {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// First N characters of the secret, safe to display (non-secret).
    pub prefix: String,
    /// SHA-256 hex digest of the full secret. The plaintext is never stored.
    pub secret_digest: String,
    pub scope: CredentialScope,
    /// CIDR allowlist; empty means "no restriction".
    pub ip_allowlist: Vec<String>,
    /// Per-credential rate-limit ceiling override (requests/60s), None = tier default.
    pub rate_limit_override: Option<i32>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Export job type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "job_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Csv,
    Json,
    Xlsx,
}

impl JobType {
    /// File extension for the object-store key.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Xlsx => "xlsx",
        }
    }
}

/// Job status. Transitions are monotonic: Queued -> Processing -> {Completed, Failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// A single export unit with a terminal state and a result artifact.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Job {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Credential that created the job; `None` for internal/schedule-originated jobs.
    pub credential_id: Option<Uuid>,
    pub job_type: JobType,
    /// Opaque request payload (query parameters for the data source); never introspected.
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
    pub status: JobStatus,
    /// 0-100, coalesced.
    pub progress: i32,
    pub attempts_made: i32,
    /// Broker-side message id, used to correlate lifecycle events back to this row.
    pub broker_id: Option<String>,
    /// Result: object key, byte size, row count, short-lived signed URL + its expiry.
    #[schema(value_type = Object)]
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// When the uploaded export object expires and is no longer downloadable.
    pub file_expires_at: Option<DateTime<Utc>>,
}

/// A recurring-job template driven by a cron expression.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Schedule {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub job_type: JobType,
    /// 5-field cron expression; minimum cadence 1h (§4.8).
    pub cron_expression: String,
    #[schema(value_type = Object)]
    pub payload_template: serde_json::Value,
    pub active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// An idempotency-keyed usage record for billing, unique per job id.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
pub struct UsageRecord {
    pub job_id: Uuid,
    pub tenant_id: Uuid,
    pub row_count: i64,
    /// First-of-month billing period this usage is attributed to.
    pub billing_period: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Webhook delivery status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "delivery_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

/// Webhook event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "webhook_event", rename_all = "snake_case")]
pub enum WebhookEvent {
    #[serde(rename = "export.completed")]
    #[sqlx(rename = "export.completed")]
    ExportCompleted,
    #[serde(rename = "export.failed")]
    #[sqlx(rename = "export.failed")]
    ExportFailed,
}

impl WebhookEvent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExportCompleted => "export.completed",
            Self::ExportFailed => "export.failed",
        }
    }
}

/// A webhook delivery attempt ledger row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub job_id: Uuid,
    pub tenant_id: Uuid,
    pub event: WebhookEvent,
    pub status: DeliveryStatus,
    pub attempts: i32,
    pub http_status: Option<i32>,
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable audit-log row. Insert-only: the storage layer refuses UPDATE/DELETE
/// against this table outside the privileged anonymization path (see `audit.rs`).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AuditEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Credential id or "schedule"/"retention"/"system" for internal actors.
    pub actor: String,
    pub action: String,
    pub target_type: String,
    pub target_id: String,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub ip: Option<String>,
    pub created_at: DateTime<Utc>,
}
