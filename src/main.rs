use anyhow::Context;
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app;
mod common;
mod config;
mod docs;
mod infrastructure;
mod modules;
mod routes;
mod state;
#[cfg(test)]
mod testing;
mod workers;

use crate::config::settings::AppConfig;
use crate::infrastructure::db::pool::{connect_to_db, ensure_schema};
use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::infrastructure::redis::client::RedisService;
use crate::infrastructure::storage::s3::StorageService;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::new().context("Missing required environment variable")?;
    config.validate()?;

    let db = connect_to_db(&config.database_url).await?;
    ensure_schema(&db).await?;
    let redis = RedisService::new(&config.redis_url).await?;
    let queue = RabbitMqService::new(&config.rabbitmq_url).await?;
    let storage = StorageService::new(
        &config.minio_url,
        &config.minio_source_bucket,
        &config.minio_converted_bucket,
        &config.minio_access_key,
        &config.minio_secret_key,
    )
    .await;

    let state = AppState::new(config, db, redis, queue, storage);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => {}
        [command, job_id] if command == "convert" => {
            info!(job_id = %job_id, "Running single conversion job");
            return workers::converter::run_job(&state, job_id).await;
        }
        _ => anyhow::bail!("usage: video-converter [convert <jobId>]"),
    }

    let worker_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = workers::converter::start_conversion_worker(worker_state).await {
            error!("❌ Conversion worker stopped: {:#}", e);
        }
    });

    let addr = format!("0.0.0.0:{}", state.config.server_port);
    let app = app::create_app(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
