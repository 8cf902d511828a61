//! Export job creation, inspection, listing, and download (§6 `/api/v1/jobs`).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::auth::ResolvedCredential;
use crate::db::{self, JobStatus, JobType};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateJobRequest {
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CreateJobResponse {
    pub id: Uuid,
    pub broker_id: Option<String>,
    pub status: JobStatus,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobView {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: i32,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[schema(value_type = Option<Object>)]
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl From<db::Job> for JobView {
    fn from(job: db::Job) -> Self {
        let updated_at = job.completed_at.or(job.started_at).unwrap_or(job.created_at);
        Self {
            id: job.id,
            status: job.status,
            progress: job.progress,
            job_type: job.job_type,
            created_at: job.created_at,
            updated_at,
            result: job.result,
            error: job.error_message,
        }
    }
}

/// POST /api/v1/jobs - admit and enqueue a new export job. Requires WRITE.
#[utoipa::path(
    post,
    path = "/api/v1/jobs",
    tag = "jobs",
    request_body = CreateJobRequest,
    responses((status = 201, description = "Job admitted", body = CreateJobResponse)),
    security(("bearer_auth" = [])),
)]
pub async fn create_job(
    State(state): State<AppState>,
    credential: ResolvedCredential,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<CreateJobResponse>)> {
    let job = crate::jobs::admit_job(
        &state.db,
        &state.redis,
        credential.tenant_id,
        Some(credential.id),
        request.job_type,
        request.payload,
    )
    .await?;

    crate::audit::record(
        &state.db,
        credential.tenant_id,
        &credential.id.to_string(),
        "job.created",
        "job",
        &job.id.to_string(),
        serde_json::json!({ "type": job.job_type }),
        None,
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(CreateJobResponse {
            id: job.id,
            broker_id: job.broker_id,
            status: job.status,
        }),
    ))
}

/// GET /api/v1/jobs/:id - fetch a single job. Requires READ.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    tag = "jobs",
    params(("id" = Uuid, Path, description = "Job id")),
    responses((status = 200, description = "Job", body = JobView)),
    security(("bearer_auth" = [])),
)]
pub async fn get_job(
    State(state): State<AppState>,
    credential: ResolvedCredential,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobView>> {
    let job = db::find_job(&state.db, job_id, credential.tenant_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(JobView::from(job)))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<JobStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

/// GET /api/v1/jobs?status&limit&offset - paginated job listing. Requires READ.
#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    tag = "jobs",
    params(
        ("status" = Option<JobStatus>, Query, description = "Filter by status"),
        ("limit" = Option<i64>, Query, description = "Page size, default 50, max 200"),
        ("offset" = Option<i64>, Query, description = "Row offset"),
    ),
    responses((status = 200, description = "Jobs for the authenticated tenant", body = [JobView])),
    security(("bearer_auth" = [])),
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    credential: ResolvedCredential,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<Vec<JobView>>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let jobs = db::list_jobs(&state.db, credential.tenant_id, query.status, limit, offset).await?;
    Ok(Json(jobs.into_iter().map(JobView::from).collect()))
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DownloadResponse {
    pub download_url: String,
    pub expires_at: DateTime<Utc>,
    pub file_expires_at: Option<DateTime<Utc>>,
}

/// GET /api/v1/jobs/:id/download - presign a short-lived download URL.
///
/// 400 `EXPORT_NOT_READY` if the job hasn't completed; 410 if the file has
/// passed its retention window (§4.9 deletes the object but not the row).
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/download",
    tag = "jobs",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 200, description = "Signed download URL", body = DownloadResponse),
        (status = 400, description = "Export not ready"),
        (status = 410, description = "File expired"),
    ),
    security(("bearer_auth" = [])),
)]
pub async fn download_job(
    State(state): State<AppState>,
    credential: ResolvedCredential,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<DownloadResponse>> {
    let job = db::find_job(&state.db, job_id, credential.tenant_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if job.status != JobStatus::Completed {
        return Err(ApiError::ExportNotReady);
    }

    if let Some(file_expires_at) = job.file_expires_at {
        if file_expires_at <= Utc::now() {
            return Err(ApiError::Gone("export file has expired".into()));
        }
    }

    let object_key = job
        .result
        .as_ref()
        .and_then(|r| r.get("object_key"))
        .and_then(|v| v.as_str())
        .ok_or(ApiError::NotFound)?;

    let download_url = state.s3.presign_get(object_key).await?;

    Ok(Json(DownloadResponse {
        download_url,
        expires_at: Utc::now() + chrono::Duration::seconds(state.config.s3_presign_expiry_secs as i64),
        file_expires_at: job.file_expires_at,
    }))
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use super::*;
    use crate::api::test_support::{insert_test_tenant, test_state};
    use crate::db::CredentialScope;

    fn writer(tenant_id: Uuid) -> ResolvedCredential {
        ResolvedCredential {
            id: Uuid::new_v4(),
            tenant_id,
            scope: CredentialScope::Write,
        }
    }

    #[sqlx::test]
    async fn create_get_and_list_round_trip(pool: PgPool) {
        let tenant_id = insert_test_tenant(&pool).await;
        let state = test_state(pool).await;

        let (status, Json(created)) = create_job(
            State(state.clone()),
            writer(tenant_id),
            Json(CreateJobRequest {
                job_type: JobType::Csv,
                payload: serde_json::json!({"source": "orders"}),
            }),
        )
        .await
        .expect("create_job failed");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.status, JobStatus::Queued);

        let Json(fetched) = get_job(State(state.clone()), writer(tenant_id), Path(created.id))
            .await
            .expect("get_job failed");
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.job_type, JobType::Csv);

        let Json(listed) = list_jobs(
            State(state),
            writer(tenant_id),
            Query(ListJobsQuery {
                status: None,
                limit: None,
                offset: None,
            }),
        )
        .await
        .expect("list_jobs failed");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
    }

    #[sqlx::test]
    async fn get_job_missing_is_not_found(pool: PgPool) {
        let tenant_id = insert_test_tenant(&pool).await;
        let state = test_state(pool).await;

        let result = get_job(State(state), writer(tenant_id), Path(Uuid::new_v4())).await;
        assert!(matches!(result, Err(ApiError::NotFound)));
    }

    #[sqlx::test]
    async fn download_before_completion_is_not_ready(pool: PgPool) {
        let tenant_id = insert_test_tenant(&pool).await;
        let state = test_state(pool).await;

        let job = db::insert_job(&state.db, tenant_id, None, JobType::Json, serde_json::json!({}))
            .await
            .expect("insert_job failed");

        let result = download_job(State(state), writer(tenant_id), Path(job.id)).await;
        assert!(matches!(result, Err(ApiError::ExportNotReady)));
    }

    #[sqlx::test]
    async fn download_after_file_expiry_is_gone(pool: PgPool) {
        let tenant_id = insert_test_tenant(&pool).await;
        let state = test_state(pool).await;

        let job = db::insert_job(&state.db, tenant_id, None, JobType::Json, serde_json::json!({}))
            .await
            .expect("insert_job failed");
        db::mark_job_completed(
            &state.db,
            job.id,
            serde_json::json!({"object_key": "exports/whatever/key.json"}),
            Utc::now() - chrono::Duration::seconds(1),
        )
        .await
        .expect("mark_job_completed failed");

        let result = download_job(State(state), writer(tenant_id), Path(job.id)).await;
        assert!(matches!(result, Err(ApiError::Gone(_))));
    }
}
