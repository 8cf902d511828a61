//! API router and shared application state (§6).

pub mod account;
pub mod audit_handlers;
pub mod credentials;
pub mod health_route;
pub mod jobs_handlers;
pub mod schedules;

use std::sync::Arc;

use axum::extract::FromRef;
use axum::http::{header, Method};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{delete, get, post};
use axum::Router;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::auth::require_credential;
use crate::config::Config;
use crate::email::EmailService;
use crate::ratelimit::{rate_limit_by_credential, with_category, RateLimitCategory, RateLimiter};
use crate::s3::S3Client;

/// Shared application state, cloned cheaply into every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub redis: fred::prelude::RedisClient,
    pub config: Arc<Config>,
    pub s3: S3Client,
    pub rate_limiter: Option<RateLimiter>,
    pub email: Option<Arc<EmailService>>,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

/// Configuration for creating a new [`AppState`].
pub struct AppStateConfig {
    pub db: PgPool,
    pub redis: fred::prelude::RedisClient,
    pub config: Config,
    pub s3: S3Client,
    pub rate_limiter: Option<RateLimiter>,
    pub email: Option<EmailService>,
}

impl AppState {
    #[must_use]
    pub fn new(cfg: AppStateConfig) -> Self {
        Self {
            db: cfg.db,
            redis: cfg.redis,
            config: Arc::new(cfg.config),
            s3: cfg.s3,
            rate_limiter: cfg.rate_limiter,
            email: cfg.email.map(Arc::new),
        }
    }
}

/// Build the router for the full HTTP surface (§6).
pub fn create_router(state: AppState) -> Router {
    let cors = if state.config.cors_allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = state
            .config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true)
    };

    let export_creation_routes = Router::new()
        .route("/api/v1/jobs", post(jobs_handlers::create_job))
        .layer(from_fn_with_state(state.clone(), rate_limit_by_credential))
        .layer(from_fn(with_category(RateLimitCategory::ExportCreation)));

    let download_routes = Router::new()
        .route("/api/v1/jobs/{id}/download", get(jobs_handlers::download_job))
        .layer(from_fn_with_state(state.clone(), rate_limit_by_credential))
        .layer(from_fn(with_category(RateLimitCategory::Download)));

    let general_routes = Router::new()
        .route("/api/v1/jobs", get(jobs_handlers::list_jobs))
        .route("/api/v1/jobs/{id}", get(jobs_handlers::get_job))
        .route(
            "/api/v1/keys",
            get(credentials::list_keys).post(credentials::create_key),
        )
        .route("/api/v1/keys/{id}", delete(credentials::revoke_key))
        .route(
            "/api/v1/schedules",
            get(schedules::list_schedules).post(schedules::create_schedule),
        )
        .route(
            "/api/v1/schedules/{id}",
            get(schedules::get_schedule)
                .patch(schedules::update_schedule)
                .delete(schedules::delete_schedule),
        )
        .route("/api/v1/audit-logs", get(audit_handlers::list_audit_logs))
        .route("/api/v1/account/export", post(account::request_data_export))
        .route("/api/v1/account", delete(account::delete_account))
        .layer(from_fn_with_state(state.clone(), rate_limit_by_credential))
        .layer(from_fn(with_category(RateLimitCategory::General)));

    let protected = export_creation_routes
        .merge(download_routes)
        .merge(general_routes)
        .layer(from_fn_with_state(state.clone(), require_credential));

    Router::new()
        .route("/health", get(health_route::health_check))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

/// Shared handler-test plumbing: a real `AppState` pointed at the local test
/// containers `Config::default_for_test` documents, so handler tests exercise
/// the same `sqlx`/`fred`/S3 code paths production does.
#[cfg(test)]
pub(crate) mod test_support {
    use sqlx::PgPool;
    use uuid::Uuid;

    use super::{AppState, AppStateConfig};
    use crate::config::Config;
    use crate::db;
    use crate::s3::S3Client;

    pub(crate) async fn test_state(pool: PgPool) -> AppState {
        let config = Config::default_for_test();
        let redis = db::create_redis_client(&config.redis_url)
            .await
            .expect("failed to connect to test Redis");
        let s3 = S3Client::new(&config)
            .await
            .expect("failed to initialize test S3 client");

        AppState::new(AppStateConfig {
            db: pool,
            redis,
            config,
            s3,
            rate_limiter: None,
            email: None,
        })
    }

    /// Insert a tenant with a unique email and return its id. No `db::insert_tenant`
    /// exists (tenants are provisioned out of band), so tests write the row directly.
    pub(crate) async fn insert_test_tenant(pool: &PgPool) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO tenants (id, name, email) VALUES ($1, $2, $3)",
        )
        .bind(id)
        .bind("Test Tenant")
        .bind(format!("{id}@example.test"))
        .execute(pool)
        .await
        .expect("failed to insert test tenant");
        id
    }
}
