// Worker pool manager.
//
// One fixed-size pool per (step, tier), shared by every tenant of the tier.
// Workers are interchangeable and hold no tenant state between messages.
// Shutdown is cooperative: the stop flag is checked between messages and
// workers get a bounded grace period before being aborted.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use workpulse_core::{queue_name, PipelineStep, Tier};

use crate::retry::RetryMiddleware;
use crate::sync::{run_sync, ExecutionMode, SyncDeps, SyncRequest};
use crate::transform::{dispatch, TransformContext};

pub struct WorkerPoolManager {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    grace: Duration,
}

impl WorkerPoolManager {
    /// Spawn extraction and transform pools for every tier
    pub fn start(deps: SyncDeps) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::new();
        let config = deps.config.clone();

        for tier in Tier::ALL {
            for worker_index in 0..tier.extraction_workers() {
                handles.push(tokio::spawn(extraction_worker_loop(
                    deps.clone(),
                    tier,
                    worker_index,
                    shutdown_rx.clone(),
                )));
            }
            for worker_index in 0..tier.transform_workers() {
                let ctx = TransformContext {
                    db: deps.db.clone(),
                    queues: deps.queues.clone(),
                    status: deps.status.clone(),
                    config: deps.config.clone(),
                    tier,
                };
                handles.push(tokio::spawn(transform_worker_loop(
                    ctx,
                    tier,
                    worker_index,
                    shutdown_rx.clone(),
                )));
            }
        }

        tracing::info!(workers = handles.len(), "worker pools started");
        Self {
            shutdown_tx,
            handles,
            grace: Duration::from_secs(config.shutdown_grace_secs),
        }
    }

    /// Cooperative stop: workers finish their current message, stragglers
    /// are aborted after the grace period. Workers are not restarted.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let join_all = async {
            for handle in self.handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(self.grace, join_all).await.is_err() {
            tracing::warn!("workers did not stop within the grace period");
        }
        tracing::info!("worker pools stopped");
    }
}

async fn extraction_worker_loop(
    deps: SyncDeps,
    tier: Tier,
    worker_index: usize,
    shutdown_rx: watch::Receiver<bool>,
) {
    let queue = queue_name(PipelineStep::Extraction, tier);
    let lease = Duration::from_secs(deps.config.message_lease_secs);
    let idle = Duration::from_millis(deps.config.poll_interval_ms);
    tracing::debug!(%queue, worker_index, "extraction worker started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let leased = deps.db.lease_one(&queue, lease).await;
        match leased {
            Ok(Some(message)) => {
                let request: SyncRequest = match serde_json::from_value(message.payload.clone()) {
                    Ok(request) => request,
                    Err(err) => {
                        tracing::warn!(%queue, error = %err, "undecodable sync request dropped");
                        let _ = deps.db.ack_message(message.id).await;
                        continue;
                    }
                };

                let mode = ExecutionMode::parse(&request.execution_mode)
                    .unwrap_or(ExecutionMode::All);
                let outcome = run_sync(
                    &deps,
                    request.job_schedule_id,
                    mode,
                    request.custom_query.clone(),
                    request.target_projects.clone(),
                )
                .await;

                if let Some(error) = &outcome.error {
                    tracing::warn!(
                        job_schedule_id = request.job_schedule_id,
                        %error,
                        "sync run did not complete"
                    );
                }
                // run_sync settles the schedule state; the request is spent
                if let Err(err) = deps.db.ack_message(message.id).await {
                    tracing::error!(%queue, error = %err, "ack failed");
                }
            }
            Ok(None) => tokio::time::sleep(idle).await,
            Err(err) => {
                tracing::error!(%queue, error = %err, "extraction poll failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
    tracing::debug!(%queue, worker_index, "extraction worker stopped");
}

async fn transform_worker_loop(
    ctx: TransformContext,
    tier: Tier,
    worker_index: usize,
    shutdown_rx: watch::Receiver<bool>,
) {
    let queue = queue_name(PipelineStep::Transform, tier);
    let lease = Duration::from_secs(ctx.config.message_lease_secs);
    let idle = Duration::from_millis(ctx.config.poll_interval_ms);
    let middleware = RetryMiddleware::new(
        ctx.db.clone(),
        ctx.queues.clone(),
        ctx.config.max_message_retries,
    );
    tracing::debug!(%queue, worker_index, "transform worker started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match ctx.queues.get_single_message(&queue, lease).await {
            Ok(Some((message, envelope))) => {
                let handler_ctx = ctx.clone();
                let result = middleware
                    .run(&queue, &message, envelope, |envelope| async move {
                        dispatch(&handler_ctx, &envelope).await
                    })
                    .await;
                if let Err(err) = result {
                    tracing::error!(%queue, error = %err, "message recovery failed");
                }
            }
            Ok(None) => tokio::time::sleep(idle).await,
            Err(err) => {
                tracing::error!(%queue, error = %err, "transform poll failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
    tracing::debug!(%queue, worker_index, "transform worker stopped");
}
