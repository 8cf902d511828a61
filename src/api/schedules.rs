//! Recurring export schedule CRUD (§6 `/api/v1/schedules`, §4.8).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::auth::ResolvedCredential;
use crate::db::{self, JobType};
use crate::schedule;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateScheduleRequest {
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub cron_expression: String,
    #[serde(default)]
    pub payload_template: serde_json::Value,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateScheduleRequest {
    pub cron_expression: Option<String>,
    pub payload_template: Option<serde_json::Value>,
    pub active: Option<bool>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ScheduleView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub cron_expression: String,
    #[schema(value_type = Object)]
    pub payload_template: serde_json::Value,
    pub active: bool,
    pub last_run_at: Option<chrono::DateTime<chrono::Utc>>,
    pub next_run_at: chrono::DateTime<chrono::Utc>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<db::Schedule> for ScheduleView {
    fn from(s: db::Schedule) -> Self {
        Self {
            id: s.id,
            job_type: s.job_type,
            cron_expression: s.cron_expression,
            payload_template: s.payload_template,
            active: s.active,
            last_run_at: s.last_run_at,
            next_run_at: s.next_run_at,
            created_at: s.created_at,
        }
    }
}

/// GET /api/v1/schedules - list the tenant's recurring export templates.
#[utoipa::path(
    get,
    path = "/api/v1/schedules",
    tag = "schedules",
    responses((status = 200, description = "Schedules", body = [ScheduleView])),
    security(("bearer_auth" = [])),
)]
pub async fn list_schedules(
    State(state): State<AppState>,
    credential: ResolvedCredential,
) -> ApiResult<Json<Vec<ScheduleView>>> {
    let rows = db::list_schedules(&state.db, credential.tenant_id).await?;
    Ok(Json(rows.into_iter().map(ScheduleView::from).collect()))
}

/// POST /api/v1/schedules - create a recurring export template.
///
/// Cadence is validated against the 1-hour minimum (§4.8) before the row is written.
#[utoipa::path(
    post,
    path = "/api/v1/schedules",
    tag = "schedules",
    request_body = CreateScheduleRequest,
    responses(
        (status = 201, description = "Schedule created", body = ScheduleView),
        (status = 400, description = "Cron expression invalid or too frequent"),
    ),
    security(("bearer_auth" = [])),
)]
pub async fn create_schedule(
    State(state): State<AppState>,
    credential: ResolvedCredential,
    Json(request): Json<CreateScheduleRequest>,
) -> ApiResult<(StatusCode, Json<ScheduleView>)> {
    let now = chrono::Utc::now();
    schedule::validate_cron(&request.cron_expression, now)?;
    let next_run_at = schedule::cron::next_run_after(&request.cron_expression, now)?;

    let row = db::insert_schedule(
        &state.db,
        credential.tenant_id,
        request.job_type,
        &request.cron_expression,
        request.payload_template,
        next_run_at,
    )
    .await?;

    crate::audit::record(
        &state.db,
        credential.tenant_id,
        &credential.id.to_string(),
        "schedule.created",
        "schedule",
        &row.id.to_string(),
        serde_json::json!({ "cron_expression": row.cron_expression }),
        None,
    )
    .await;

    Ok((StatusCode::CREATED, Json(ScheduleView::from(row))))
}

/// GET /api/v1/schedules/:id
#[utoipa::path(
    get,
    path = "/api/v1/schedules/{id}",
    tag = "schedules",
    params(("id" = Uuid, Path, description = "Schedule id")),
    responses((status = 200, description = "Schedule", body = ScheduleView)),
    security(("bearer_auth" = [])),
)]
pub async fn get_schedule(
    State(state): State<AppState>,
    credential: ResolvedCredential,
    Path(schedule_id): Path<Uuid>,
) -> ApiResult<Json<ScheduleView>> {
    let row = db::find_schedule(&state.db, schedule_id, credential.tenant_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(ScheduleView::from(row)))
}

/// PATCH /api/v1/schedules/:id - update cadence, payload template, or active flag.
/// Requires ADMIN scope (any non-GET/HEAD/POST method does, per §4.1).
#[utoipa::path(
    patch,
    path = "/api/v1/schedules/{id}",
    tag = "schedules",
    params(("id" = Uuid, Path, description = "Schedule id")),
    request_body = UpdateScheduleRequest,
    responses((status = 200, description = "Schedule updated", body = ScheduleView)),
    security(("bearer_auth" = [])),
)]
pub async fn update_schedule(
    State(state): State<AppState>,
    credential: ResolvedCredential,
    Path(schedule_id): Path<Uuid>,
    Json(request): Json<UpdateScheduleRequest>,
) -> ApiResult<Json<ScheduleView>> {
    let existing = db::find_schedule(&state.db, schedule_id, credential.tenant_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let cron_expression = request.cron_expression.as_deref().unwrap_or(&existing.cron_expression);
    let now = chrono::Utc::now();
    schedule::validate_cron(cron_expression, now)?;
    let next_run_at = schedule::cron::next_run_after(cron_expression, now)?;

    let payload_template = request.payload_template.unwrap_or(existing.payload_template);

    let row = db::update_schedule(
        &state.db,
        schedule_id,
        credential.tenant_id,
        cron_expression,
        payload_template,
        next_run_at,
    )
    .await?
    .ok_or(ApiError::NotFound)?;

    if let Some(active) = request.active {
        db::set_schedule_active(&state.db, row.id, credential.tenant_id, active).await?;
    }

    let row = db::find_schedule(&state.db, row.id, credential.tenant_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(ScheduleView::from(row)))
}

/// DELETE /api/v1/schedules/:id - requires ADMIN scope.
#[utoipa::path(
    delete,
    path = "/api/v1/schedules/{id}",
    tag = "schedules",
    params(("id" = Uuid, Path, description = "Schedule id")),
    responses((status = 204, description = "Schedule deleted")),
    security(("bearer_auth" = [])),
)]
pub async fn delete_schedule(
    State(state): State<AppState>,
    credential: ResolvedCredential,
    Path(schedule_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let deleted = db::delete_schedule(&state.db, schedule_id, credential.tenant_id).await?;
    if !deleted {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use super::*;
    use crate::api::test_support::{insert_test_tenant, test_state};
    use crate::db::CredentialScope;

    fn admin(tenant_id: Uuid) -> ResolvedCredential {
        ResolvedCredential {
            id: Uuid::new_v4(),
            tenant_id,
            scope: CredentialScope::Admin,
        }
    }

    #[sqlx::test]
    async fn create_schedule_rejects_sub_hourly_cadence(pool: PgPool) {
        let tenant_id = insert_test_tenant(&pool).await;
        let state = test_state(pool).await;

        let result = create_schedule(
            State(state),
            admin(tenant_id),
            Json(CreateScheduleRequest {
                job_type: JobType::Csv,
                cron_expression: "* * * * *".into(),
                payload_template: serde_json::json!({}),
            }),
        )
        .await;

        assert!(result.is_err());
    }

    #[sqlx::test]
    async fn update_schedule_preserves_id_and_changes_cron(pool: PgPool) {
        let tenant_id = insert_test_tenant(&pool).await;
        let state = test_state(pool).await;

        let (_, Json(created)) = create_schedule(
            State(state.clone()),
            admin(tenant_id),
            Json(CreateScheduleRequest {
                job_type: JobType::Json,
                cron_expression: "0 * * * *".into(),
                payload_template: serde_json::json!({}),
            }),
        )
        .await
        .expect("create_schedule failed");

        let Json(updated) = update_schedule(
            State(state.clone()),
            admin(tenant_id),
            Path(created.id),
            Json(UpdateScheduleRequest {
                cron_expression: Some("0 0 * * *".into()),
                payload_template: None,
                active: Some(false),
            }),
        )
        .await
        .expect("update_schedule failed");

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.cron_expression, "0 0 * * *");
        assert!(!updated.active);
    }

    #[sqlx::test]
    async fn delete_schedule_missing_is_not_found(pool: PgPool) {
        let tenant_id = insert_test_tenant(&pool).await;
        let state = test_state(pool).await;

        let result = delete_schedule(State(state), admin(tenant_id), Path(Uuid::new_v4())).await;
        assert!(matches!(result, Err(ApiError::NotFound)));
    }
}
