// Queue manager: tier-routed publishing and single-message consumption over
// the durable queue store.

use std::time::Duration;

use workpulse_core::{queue_name, JobEnvelope, PipelineError, PipelineStep, Result, Tier};
use workpulse_storage::{Database, LeasedMessage};

const PUBLISH_RETRIES: u32 = 3;

#[derive(Clone)]
pub struct QueueManager {
    db: Database,
}

impl QueueManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Idempotent: one durable queue per (step, tier)
    pub async fn setup_queues(&self) -> Result<()> {
        for step in PipelineStep::ALL {
            for tier in Tier::ALL {
                let name = queue_name(step, tier);
                self.db
                    .ensure_queue(&name, step.as_str(), tier.as_str())
                    .await
                    .map_err(|e| PipelineError::queue(e.to_string()))?;
            }
        }
        tracing::info!("queue topology ready");
        Ok(())
    }

    pub async fn publish_extraction_job(&self, tier: Tier, envelope: &JobEnvelope) -> bool {
        self.publish(PipelineStep::Extraction, tier, envelope).await
    }

    pub async fn publish_transform_job(&self, tier: Tier, envelope: &JobEnvelope) -> bool {
        self.publish(PipelineStep::Transform, tier, envelope).await
    }

    pub async fn publish_embedding_job(&self, tier: Tier, envelope: &JobEnvelope) -> bool {
        self.publish(PipelineStep::Embedding, tier, envelope).await
    }

    /// Publish with confirmation; up to 3 attempts with exponential backoff.
    /// Terminal failure is reported as `false` so the caller can dead-letter.
    async fn publish(&self, step: PipelineStep, tier: Tier, envelope: &JobEnvelope) -> bool {
        let queue = queue_name(step, tier);
        let payload = match serde_json::to_value(envelope) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(queue, error = %err, "envelope serialization failed");
                return false;
            }
        };

        for attempt in 1..=PUBLISH_RETRIES {
            match self.db.enqueue(&queue, &payload).await {
                Ok(_) => return true,
                Err(err) if attempt < PUBLISH_RETRIES => {
                    tracing::warn!(queue, attempt, error = %err, "publish failed, retrying");
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                }
                Err(err) => {
                    tracing::error!(queue, error = %err, "publish failed terminally");
                }
            }
        }
        false
    }

    /// Republish after a handler failure, delayed and with the retry counter
    /// bumped in both the envelope and the queue row.
    pub async fn republish_for_retry(
        &self,
        queue: &str,
        envelope: &JobEnvelope,
        delay: Duration,
    ) -> Result<()> {
        let payload =
            serde_json::to_value(envelope).map_err(|e| PipelineError::queue(e.to_string()))?;
        self.db
            .enqueue_with_delay(queue, &payload, delay, envelope.retry_count as i32)
            .await
            .map_err(|e| PipelineError::queue(e.to_string()))?;
        Ok(())
    }

    /// Poll one message with manual ack semantics
    pub async fn get_single_message(
        &self,
        queue: &str,
        lease: Duration,
    ) -> Result<Option<(LeasedMessage, JobEnvelope)>> {
        let leased = self
            .db
            .lease_one(queue, lease)
            .await
            .map_err(|e| PipelineError::queue(e.to_string()))?;

        match leased {
            Some(message) => match serde_json::from_value(message.payload.clone()) {
                Ok(envelope) => Ok(Some((message, envelope))),
                Err(err) => {
                    // Poison message: drop it instead of redelivering forever
                    tracing::warn!(queue, message_id = message.id, error = %err,
                        "undecodable envelope dropped");
                    self.ack(message.id).await?;
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub async fn ack(&self, message_id: i64) -> Result<()> {
        self.db
            .ack_message(message_id)
            .await
            .map_err(|e| PipelineError::queue(e.to_string()))
    }

    pub async fn nack(&self, message_id: i64) -> Result<()> {
        self.db
            .nack_message(message_id)
            .await
            .map_err(|e| PipelineError::queue(e.to_string()))
    }
}
