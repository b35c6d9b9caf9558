// Extraction stage: paginate the provider, persist raw payloads, fan out
// per-entity transform messages.

pub mod dev_status;
pub mod issues;
pub mod reference;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use workpulse_core::{
    BatchFlags, ExtractionType, JobEnvelope, PipelineError, Result, Tier, WorkerConfig,
};
use workpulse_jira::JiraClient;
use workpulse_storage::{CreateRawExtraction, Database};

use crate::queue::QueueManager;
use crate::status::StatusEmitter;

/// Everything one extraction run needs; cheap to clone per step
#[derive(Clone)]
pub struct ExtractionContext {
    pub db: Database,
    pub queues: QueueManager,
    pub client: JiraClient,
    pub status: StatusEmitter,
    pub config: WorkerConfig,
    pub tenant_id: i64,
    pub tier: Tier,
    pub integration_id: i64,
    pub job_id: i64,
    pub token: Uuid,
    pub old_last_sync_date: Option<DateTime<Utc>>,
    pub new_last_sync_date: DateTime<Utc>,
}

impl ExtractionContext {
    /// Persist one raw unit and publish its transform message. Returns the
    /// raw row id; a publish failure surfaces as a queue error so the retry
    /// middleware can take over.
    pub async fn persist_and_publish(
        &self,
        extraction_type: ExtractionType,
        raw_data: serde_json::Value,
        external_id: Option<String>,
        flags: BatchFlags,
    ) -> Result<i64> {
        let raw_data_id = self
            .db
            .insert_raw_extraction(CreateRawExtraction {
                tenant_id: self.tenant_id,
                integration_id: self.integration_id,
                extraction_type: extraction_type.as_str().to_string(),
                raw_data,
            })
            .await
            .map_err(|e| PipelineError::storage(e.to_string()))?;

        let envelope = JobEnvelope::entity(
            self.tenant_id,
            self.integration_id,
            self.job_id,
            self.token,
            extraction_type,
            raw_data_id,
            external_id,
            flags,
        )
        .with_sync_window(self.old_last_sync_date, Some(self.new_last_sync_date));

        if !self.queues.publish_transform_job(self.tier, &envelope).await {
            return Err(PipelineError::queue(format!(
                "transform publish failed for raw_data_id={raw_data_id}"
            )));
        }
        Ok(raw_data_id)
    }

    /// Publish a flag message so downstream status tracking fires even when
    /// a step produced zero entities.
    pub async fn publish_marker(
        &self,
        extraction_type: ExtractionType,
        flags: BatchFlags,
    ) -> Result<()> {
        let envelope = JobEnvelope::marker(
            self.tenant_id,
            self.integration_id,
            self.job_id,
            self.token,
            extraction_type,
            flags,
        )
        .with_sync_window(self.old_last_sync_date, Some(self.new_last_sync_date));

        if !self.queues.publish_transform_job(self.tier, &envelope).await {
            return Err(PipelineError::queue("marker publish failed".to_string()));
        }
        Ok(())
    }
}

/// Incremental JQL: scope the base filter to issues updated inside the sync
/// window. Zero or negative windows floor at one day.
pub fn effective_jql(
    base_search: Option<&str>,
    window_start: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> String {
    let updated_clause = window_start.map(|start| {
        let days = (now - start).num_days();
        let days = if days <= 0 { 1 } else { days };
        format!("updated >= -{days}d")
    });

    match (base_search, updated_clause) {
        (Some(base), Some(clause)) => format!("({base}) AND {clause}"),
        (Some(base), None) => base.to_string(),
        (None, Some(clause)) => clause,
        (None, None) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_effective_jql_window() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap();

        assert_eq!(
            effective_jql(Some("project = P"), Some(start), now),
            "(project = P) AND updated >= -7d"
        );
    }

    #[test]
    fn test_effective_jql_floors_at_one_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        // Window start in the future relative to now
        let start = Utc.with_ymd_and_hms(2024, 3, 11, 12, 0, 0).unwrap();

        assert_eq!(
            effective_jql(Some("project = P"), Some(start), now),
            "(project = P) AND updated >= -1d"
        );
        assert_eq!(
            effective_jql(None, Some(now), now),
            "updated >= -1d"
        );
    }

    #[test]
    fn test_effective_jql_without_window_is_full_fetch() {
        let now = Utc::now();
        assert_eq!(effective_jql(Some("project = P"), None, now), "project = P");
        assert_eq!(effective_jql(None, None, now), "");
    }
}
