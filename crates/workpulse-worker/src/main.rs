use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use workpulse_core::WorkerConfig;
use workpulse_storage::{Database, EncryptionService};
use workpulse_worker::{
    ChannelStatusBroadcast, QueueManager, StatusEmitter, SyncDeps, WorkerPoolManager,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "workpulse_worker=debug,workpulse_storage=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("workpulse-worker starting...");

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL environment variable required")?;
    let db = Database::from_url(&database_url).await?;
    db.migrate().await?;
    tracing::info!("database connection established");

    let encryption = EncryptionService::from_env()?;
    let config = WorkerConfig::default();

    let queues = QueueManager::new(db.clone());
    queues.setup_queues().await?;

    // The broadcast transport (WebSocket fan-out) consumes this channel
    let (broadcast, mut status_rx) = ChannelStatusBroadcast::new();
    tokio::spawn(async move {
        while let Some(update) = status_rx.recv().await {
            tracing::debug!(
                tenant_id = update.tenant_id,
                job_id = update.job_id,
                "status update emitted"
            );
        }
    });

    let status = StatusEmitter::new(db.clone(), Arc::new(broadcast));
    let pools = WorkerPoolManager::start(SyncDeps {
        db,
        queues,
        status,
        encryption,
        config,
    });

    tracing::info!("worker pools ready");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    pools.shutdown().await;

    Ok(())
}
