// Status broadcasting.
//
// The emitter maintains the job status document on the schedule row and
// ships the whole document on every crossing, keyed by the envelope flags.
// The transport behind StatusBroadcast (WebSocket fan-out) lives outside
// this crate; a channel-backed implementation is provided for wiring and a
// no-op one for tests.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use workpulse_core::{JobStatusDoc, PipelineError, Result, StageState, StatusUpdate};
use workpulse_storage::Database;

#[async_trait]
pub trait StatusBroadcast: Send + Sync {
    async fn emit(&self, update: StatusUpdate) -> Result<()>;
}

/// Ships updates into an unbounded channel consumed by the broadcast layer
pub struct ChannelStatusBroadcast {
    tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl ChannelStatusBroadcast {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl StatusBroadcast for ChannelStatusBroadcast {
    async fn emit(&self, update: StatusUpdate) -> Result<()> {
        self.tx
            .send(update)
            .map_err(|e| PipelineError::queue(format!("status channel closed: {e}")))
    }
}

/// Discards updates; used in tests
#[derive(Default)]
pub struct NoopStatusBroadcast;

#[async_trait]
impl StatusBroadcast for NoopStatusBroadcast {
    async fn emit(&self, _update: StatusUpdate) -> Result<()> {
        Ok(())
    }
}

/// Stage selector within a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extraction,
    Transform,
    Embedding,
}

/// Reads, mutates and re-persists the job status document, then ships it
/// wholesale so pull and push consumers see the same shape.
#[derive(Clone)]
pub struct StatusEmitter {
    db: Database,
    broadcast: Arc<dyn StatusBroadcast>,
}

impl StatusEmitter {
    pub fn new(db: Database, broadcast: Arc<dyn StatusBroadcast>) -> Self {
        Self { db, broadcast }
    }

    /// Reset the document to all-pending for the given steps
    pub async fn start_job(&self, tenant_id: i64, job_id: i64, steps: &[&str]) -> Result<()> {
        let doc = JobStatusDoc::new(steps);
        self.persist_and_ship(tenant_id, job_id, doc).await
    }

    /// Set one stage of one step and ship the document
    pub async fn set_stage(
        &self,
        tenant_id: i64,
        job_id: i64,
        step: &str,
        stage: Stage,
        state: StageState,
    ) -> Result<()> {
        let mut doc = self.load(job_id).await?;
        match stage {
            Stage::Extraction => doc.set_extraction(step, state),
            Stage::Transform => doc.set_transform(step, state),
            Stage::Embedding => doc.set_embedding(step, state),
        }
        self.persist_and_ship(tenant_id, job_id, doc).await
    }

    /// Mark every stage failed and ship
    pub async fn fail_job(&self, tenant_id: i64, job_id: i64) -> Result<()> {
        let mut doc = self.load(job_id).await?;
        doc.fail_all();
        self.persist_and_ship(tenant_id, job_id, doc).await
    }

    async fn load(&self, job_id: i64) -> Result<JobStatusDoc> {
        let schedule = self
            .db
            .get_job_schedule(job_id)
            .await
            .map_err(|e| PipelineError::storage(e.to_string()))?;

        Ok(schedule
            .and_then(|s| s.status_doc)
            .map(|v| JobStatusDoc::from_value(&v))
            .unwrap_or_default())
    }

    async fn persist_and_ship(
        &self,
        tenant_id: i64,
        job_id: i64,
        doc: JobStatusDoc,
    ) -> Result<()> {
        let value = doc.to_value();
        self.db
            .update_job_status_doc(job_id, &value)
            .await
            .map_err(|e| PipelineError::storage(e.to_string()))?;

        self.broadcast
            .emit(StatusUpdate {
                tenant_id,
                job_id,
                status_json: value,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_broadcast_delivers() {
        let (broadcast, mut rx) = ChannelStatusBroadcast::new();
        broadcast
            .emit(StatusUpdate {
                tenant_id: 1,
                job_id: 2,
                status_json: serde_json::json!({"steps": {}}),
            })
            .await
            .unwrap();

        let update = rx.recv().await.unwrap();
        assert_eq!(update.tenant_id, 1);
        assert_eq!(update.job_id, 2);
    }
}
