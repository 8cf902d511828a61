//! Unauthenticated health probe route (§4.10, §6 `GET /health`).

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::api::AppState;
use crate::health::{self, HealthReport};

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "All dependencies reachable", body = HealthReport),
        (status = 503, description = "At least one dependency is unreachable or slow", body = HealthReport),
    ),
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = health::check(&state.db, &state.redis, &state.s3).await;
    let status = if report.status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use super::*;
    use crate::api::test_support::test_state;

    #[sqlx::test]
    async fn health_check_reports_ok_against_live_dependencies(pool: PgPool) {
        let state = test_state(pool).await;

        let (status, Json(report)) = health_check(State(state)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, "ok");
        assert!(report.database.ok);
        assert!(report.redis.ok);
        assert!(report.object_storage.ok);
    }
}
