//! HR Sync API server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use hrsync_api::config::AppConfig;
use hrsync_api::error::AppError;
use hrsync_api::state::AppState;
use hrsync_api::{build_router, telemetry};
use hrsync_assets::{AssetSyncHandler, HttpAssetClient};
use hrsync_core::clock::SystemClock;
use hrsync_event_store::MIGRATOR;
use hrsync_event_store::pg_event_queue::PgEventQueue;
use hrsync_sync::worker::SyncWorker;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    let telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    tracing::info!("Starting HR sync API server");

    // Create database connection pool and bring the schema up to date.
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    MIGRATOR.run(&pool).await?;

    let queue = Arc::new(PgEventQueue::new(pool.clone()));
    let handler = Arc::new(AssetSyncHandler::new(
        HttpAssetClient::new(config.assets.clone())?,
        config.attribute_ids,
    ));
    let clock = Arc::new(SystemClock);

    let worker = SyncWorker::new(
        queue.clone(),
        handler.clone(),
        clock.clone(),
        config.processing,
    )
    .with_poll_interval(config.poll_interval)
    .spawn();

    let app_state =
        AppState::new(queue, handler, clock, config.webhook.clone()).with_waker(worker.waker());
    let app = build_router(app_state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped; stopping sync worker");
    worker.shutdown().await;
    pool.close().await;
    telemetry.shutdown();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
