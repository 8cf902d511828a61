//! Format-dispatching export engine: source -> encoder -> sink (§4.4).

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{self, JobType};
use crate::s3::S3Client;

use super::encoders::{csv::CsvEncoder, json::JsonEncoder, xlsx::XlsxEncoder};
use super::sink::ExportSink;
use super::source::{CursorSource, Dataset};

/// The job payload shape this engine understands. Everything else in a job's
/// opaque payload blob is ignored here; only `dataset` (and, for CSV,
/// `excel_bom`) are ever read.
#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub dataset: Dataset,
    #[serde(default)]
    pub excel_bom: bool,
}

/// Progress milestone crossed during a run, for the caller to publish to the
/// broker event bus.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProgressEvent {
    pub job_id: Uuid,
    pub percent: u32,
}

/// Successful result of one export run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOutcome {
    pub object_key: String,
    pub byte_size: u64,
    pub row_count: i64,
    pub format: JobType,
}

/// Run one export job to completion, or return an error for the worker to
/// classify as retryable (§4.4 failure semantics — the engine itself never
/// decides attempt bookkeeping, only whether it succeeded).
///
/// `on_progress` is invoked synchronously for every milestone crossed; the
/// caller is responsible for publishing it to the broker event bus and is
/// expected to tolerate being called zero or more times before success.
pub async fn run(
    pool: &PgPool,
    s3: &S3Client,
    tenant_id: Uuid,
    job_id: Uuid,
    job_type: JobType,
    payload: &serde_json::Value,
    batch_size: i64,
    mut on_progress: impl FnMut(u32),
) -> Result<ExportOutcome> {
    let request: ExportRequest =
        serde_json::from_value(payload.clone()).context("invalid export job payload")?;

    let estimated_rows = match request.dataset {
        Dataset::UsageRecords => db::count_usage_records(pool, tenant_id).await?,
        Dataset::AuditEntries => db::count_audit_entries(pool, tenant_id).await?,
    };

    let mut source = CursorSource::new(pool.clone(), tenant_id, request.dataset, batch_size);

    let object_key = format!("exports/{tenant_id}/{job_id}.{}", job_type.extension());
    let content_type = match job_type {
        JobType::Csv => "text/csv",
        JobType::Json => "application/json",
        JobType::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    };

    let mut sink = ExportSink::start(s3, &object_key, content_type)
        .await
        .context("failed to start multipart upload")?;

    let result = run_pipeline(
        job_type,
        request.excel_bom,
        &mut source,
        &mut sink,
        estimated_rows,
        &mut on_progress,
    )
    .await;

    let row_count = match result {
        Ok(count) => count,
        Err(err) => {
            // Abort rather than finish: a partial object must never be
            // referenced by a completed Job row (§4.4).
            if let Err(abort_err) = sink.abort().await {
                tracing::warn!(job_id = %job_id, error = %abort_err, "failed to abort multipart upload after engine error");
            }
            return Err(err);
        }
    };

    let byte_size = sink.finish().await.context("failed to complete multipart upload")?;
    on_progress(100);

    Ok(ExportOutcome {
        object_key,
        byte_size,
        row_count,
        format: job_type,
    })
}

async fn run_pipeline(
    job_type: JobType,
    excel_bom: bool,
    source: &mut CursorSource,
    sink: &mut ExportSink,
    estimated_rows: i64,
    on_progress: &mut impl FnMut(u32),
) -> Result<i64> {
    let mut row_count: i64 = 0;
    let mut estimate_set = false;

    match job_type {
        JobType::Csv => {
            let mut encoder = CsvEncoder::new(excel_bom);
            loop {
                let batch = source.next_page().await?;
                if batch.is_empty() {
                    break;
                }
                row_count += batch.len() as i64;
                let bytes = encoder.encode_batch(&batch)?;
                if !estimate_set && !bytes.is_empty() {
                    apply_estimate(sink, &bytes, batch.len(), estimated_rows);
                    estimate_set = true;
                }
                if let Some(pct) = sink.write(&bytes).await? {
                    on_progress(pct);
                }
            }
            let tail = encoder.finish();
            if !tail.is_empty() {
                if let Some(pct) = sink.write(&tail).await? {
                    on_progress(pct);
                }
            }
        }
        JobType::Json => {
            let mut encoder = JsonEncoder::new();
            loop {
                let batch = source.next_page().await?;
                if batch.is_empty() {
                    break;
                }
                row_count += batch.len() as i64;
                let bytes = encoder.encode_batch(&batch)?;
                if !estimate_set && !bytes.is_empty() {
                    apply_estimate(sink, &bytes, batch.len(), estimated_rows);
                    estimate_set = true;
                }
                if let Some(pct) = sink.write(&bytes).await? {
                    on_progress(pct);
                }
            }
            let tail = encoder.finish();
            if let Some(pct) = sink.write(&tail).await? {
                on_progress(pct);
            }
        }
        JobType::Xlsx => {
            let mut encoder = XlsxEncoder::new().map_err(|e| anyhow!(e))?;
            loop {
                let batch = source.next_page().await?;
                if batch.is_empty() {
                    break;
                }
                row_count += batch.len() as i64;
                encoder.encode_batch(&batch)?;
            }
            let buffer = encoder.finish()?;
            if !buffer.is_empty() {
                apply_estimate(sink, &buffer, row_count.max(1) as usize, estimated_rows);
            }
            if let Some(pct) = sink.write(&buffer).await? {
                on_progress(pct);
            }
        }
    }

    Ok(row_count)
}

fn apply_estimate(sink: &mut ExportSink, sample_bytes: &[u8], sample_rows: usize, total_rows: i64) {
    if sample_rows == 0 || total_rows <= 0 {
        return;
    }
    let bytes_per_row = sample_bytes.len() as u64 / sample_rows as u64;
    sink.set_estimate(bytes_per_row * total_rows as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_request_deserializes_default_excel_bom() {
        let value = serde_json::json!({"dataset": "usage_records"});
        let request: ExportRequest = serde_json::from_value(value).unwrap();
        assert!(!request.excel_bom);
        assert_eq!(request.dataset, Dataset::UsageRecords);
    }

    #[test]
    fn export_request_rejects_unknown_dataset() {
        let value = serde_json::json!({"dataset": "not_a_real_dataset"});
        let result: Result<ExportRequest, _> = serde_json::from_value(value);
        assert!(result.is_err());
    }
}
