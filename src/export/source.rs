//! Cursor-paginated source reader (§4.4 step 1).
//!
//! A lazy, finite, non-restartable sequence of records read from a stable
//! key-ordered relation. The engine never introspects record contents; it
//! only reads pages until one comes back short of the batch size.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;

/// The exportable dataset named by a job's payload. The core never
/// interprets job payloads beyond this selector (§9): everything past
/// `dataset` is opaque to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    UsageRecords,
    AuditEntries,
}

/// A single exported record, emitted to the format encoder as a JSON object.
pub type Record = serde_json::Value;

/// Cursor-paginated reader over one tenant's chosen dataset.
pub struct CursorSource {
    pool: PgPool,
    tenant_id: Uuid,
    dataset: Dataset,
    cursor: Option<Uuid>,
    batch_size: i64,
    exhausted: bool,
}

impl CursorSource {
    #[must_use]
    pub fn new(pool: PgPool, tenant_id: Uuid, dataset: Dataset, batch_size: i64) -> Self {
        Self {
            pool,
            tenant_id,
            dataset,
            cursor: None,
            batch_size,
            exhausted: false,
        }
    }

    /// Read the next page. Returns an empty vec exactly once the source is exhausted.
    pub async fn next_page(&mut self) -> Result<Vec<Record>> {
        if self.exhausted {
            return Ok(Vec::new());
        }

        let records: Vec<Record> = match self.dataset {
            Dataset::UsageRecords => {
                let rows =
                    db::usage_records_page(&self.pool, self.tenant_id, self.cursor, self.batch_size)
                        .await?;
                if let Some(last) = rows.last() {
                    self.cursor = Some(last.job_id);
                }
                rows.into_iter()
                    .map(|r| serde_json::to_value(r).unwrap_or(serde_json::Value::Null))
                    .collect()
            }
            Dataset::AuditEntries => {
                let rows =
                    db::audit_entries_page(&self.pool, self.tenant_id, self.cursor, self.batch_size)
                        .await?;
                if let Some(last) = rows.last() {
                    self.cursor = Some(last.id);
                }
                rows.into_iter()
                    .map(|r| serde_json::to_value(r).unwrap_or(serde_json::Value::Null))
                    .collect()
            }
        };

        if (records.len() as i64) < self.batch_size {
            self.exhausted = true;
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_round_trips_through_payload_json() {
        let payload = serde_json::json!({"dataset": "usage_records"});
        let dataset: Dataset = serde_json::from_value(payload["dataset"].clone()).unwrap();
        assert_eq!(dataset, Dataset::UsageRecords);
    }
}
