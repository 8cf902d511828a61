//! ExportKit server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use exportkit::api::{AppState, AppStateConfig};
use exportkit::config::Config;
use exportkit::db;
use exportkit::email::EmailService;
use exportkit::ratelimit::{RateLimitConfig, RateLimiter};
use exportkit::s3::S3Client;
use exportkit::{api, retention, schedule, shutdown, webhooks, worker};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "exportkit=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env().context("failed to load configuration")?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting exportkit");

    let pool = db::create_pool(&config.database_url)
        .await
        .context("failed to connect to PostgreSQL")?;
    db::run_migrations(&pool).await.context("failed to run migrations")?;

    let redis = db::create_redis_client(&config.redis_url)
        .await
        .context("failed to connect to Redis")?;

    let s3 = S3Client::new(&config).await.context("failed to initialize S3 client")?;
    s3.list_one().await.context("S3 bucket is not reachable")?;
    info!(bucket = %s3.bucket(), "object storage connected");

    let email = if config.has_smtp() {
        Some(EmailService::new(&config).context("failed to initialize SMTP transport")?)
    } else {
        info!("SMTP not configured, transactional/marketing emails are disabled");
        None
    };

    let rate_limiter = Some(RateLimiter::new(
        redis.clone(),
        RateLimitConfig::from_server_config(&config),
    ));

    let bind_address = config.bind_address.clone();
    let shutdown_grace = Duration::from_secs(config.shutdown_grace_secs);

    let state = AppState::new(AppStateConfig {
        db: pool.clone(),
        redis: redis.clone(),
        config: config.clone(),
        s3: s3.clone(),
        rate_limiter,
        email,
    });

    let config_arc = state.config.clone();
    let email_arc = state.email.clone();

    let mut background_tasks = Vec::new();
    background_tasks.extend(worker::pool::spawn(
        pool.clone(),
        redis.clone(),
        s3.clone(),
        config_arc.clone(),
        config_arc.export_worker_concurrency,
    ));
    background_tasks.extend(webhooks::delivery::spawn(
        pool.clone(),
        redis.clone(),
        config_arc.clone(),
        config_arc.webhook_worker_concurrency,
    ));
    background_tasks.push(worker::listener::spawn(
        pool.clone(),
        redis.clone(),
        s3.clone(),
        email_arc,
        config_arc.clone(),
    ));
    background_tasks.push(schedule::engine::spawn(pool.clone(), redis.clone(), config_arc.clone()));
    background_tasks.push(retention::engine::spawn(pool.clone(), config_arc.clone()));

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!(address = %bind_address, "server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown::signal(shutdown_grace))
        .await
        .context("server error")?;

    info!("draining complete, stopping background workers");
    shutdown::abort_background_tasks(&background_tasks);

    Ok(())
}
