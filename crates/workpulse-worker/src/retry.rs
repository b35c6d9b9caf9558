// Retry + dead-letter middleware.
//
// Handlers stay plain throwing functions; this wrapper owns retry counting,
// scheduled republish and dead-letter insertion. One message is one unit of
// work: every outcome ends with the original delivery acked.

use chrono::Utc;
use std::future::Future;
use std::time::Duration;

use workpulse_core::{JobEnvelope, PipelineError, Result};
use workpulse_storage::{CreateExtractionFailure, Database, LeasedMessage};

use crate::queue::QueueManager;

const MAX_ERROR_CHARS: usize = 500;

/// Delay before redelivery attempt `retry_count` (1-based): 2^(n-1) seconds
pub fn retry_delay(retry_count: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(retry_count.saturating_sub(1)))
}

pub struct RetryMiddleware {
    db: Database,
    queues: QueueManager,
    max_retries: u32,
}

impl RetryMiddleware {
    pub fn new(db: Database, queues: QueueManager, max_retries: u32) -> Self {
        Self {
            db,
            queues,
            max_retries,
        }
    }

    /// Run one handler under recovery. Transient failures republish with a
    /// bumped retry counter; terminal failures dead-letter; rate limits park
    /// the job schedule without retry or dead letter.
    pub async fn run<F, Fut>(
        &self,
        queue: &str,
        message: &LeasedMessage,
        envelope: JobEnvelope,
        handler: F,
    ) -> Result<()>
    where
        F: FnOnce(JobEnvelope) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let result = handler(envelope.clone()).await;

        match result {
            Ok(()) => self.queues.ack(message.id).await,
            Err(PipelineError::RateLimited { reset_at }) => {
                let next_run =
                    reset_at.unwrap_or_else(|| Utc::now() + chrono::Duration::minutes(1));
                tracing::warn!(queue, job_id = envelope.job_id, %next_run, "rate limit reached");
                self.db
                    .mark_job_rate_limited(envelope.job_id, next_run)
                    .await
                    .map_err(|e| PipelineError::storage(e.to_string()))?;
                self.queues.ack(message.id).await
            }
            Err(err) if err.is_transient() && envelope.retry_count < self.max_retries => {
                let mut retried = envelope.clone();
                retried.retry_count += 1;
                let delay = retry_delay(retried.retry_count);
                tracing::warn!(
                    queue,
                    retry_count = retried.retry_count,
                    delay_secs = delay.as_secs(),
                    error = %err,
                    "transient failure, republishing"
                );
                self.queues.republish_for_retry(queue, &retried, delay).await?;
                self.queues.ack(message.id).await
            }
            Err(err) => {
                self.dead_letter(queue, &envelope, &err).await?;
                self.queues.ack(message.id).await
            }
        }
    }

    async fn dead_letter(
        &self,
        queue: &str,
        envelope: &JobEnvelope,
        err: &PipelineError,
    ) -> Result<()> {
        let error_message: String = err.to_string().chars().take(MAX_ERROR_CHARS).collect();
        tracing::error!(queue, job_id = envelope.job_id, %error_message, "message dead-lettered");

        self.db
            .insert_extraction_failure(CreateExtractionFailure {
                tenant_id: envelope.tenant_id,
                integration_id: envelope.integration_id,
                extraction_type: envelope.message_type.clone(),
                original_message: serde_json::to_value(envelope)
                    .unwrap_or_else(|_| serde_json::json!({})),
                error_message: error_message.clone(),
            })
            .await
            .map_err(|e| PipelineError::storage(e.to_string()))?;

        if let Some(raw_data_id) = envelope.raw_data_id {
            self.db
                .mark_raw_failed(raw_data_id, &error_message)
                .await
                .map_err(|e| PipelineError::storage(e.to_string()))?;
        }

        self.db
            .mark_job_failed(envelope.job_id, &error_message)
            .await
            .map_err(|e| PipelineError::storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_schedule() {
        assert_eq!(retry_delay(1), Duration::from_secs(1));
        assert_eq!(retry_delay(2), Duration::from_secs(2));
        assert_eq!(retry_delay(3), Duration::from_secs(4));
    }
}
