// Canonical message envelope and tier routing.
//
// Every message on every queue carries the same envelope. A message with no
// entity body (null raw_data_id and external_id) is a flag/completion marker
// that exists purely to move the batch flags downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tier::Tier;

/// Pipeline stage a queue belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStep {
    Extraction,
    Transform,
    Embedding,
}

impl PipelineStep {
    pub const ALL: [PipelineStep; 3] = [
        PipelineStep::Extraction,
        PipelineStep::Transform,
        PipelineStep::Embedding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::Extraction => "extraction",
            PipelineStep::Transform => "transform",
            PipelineStep::Embedding => "embedding",
        }
    }
}

/// Router rule: one durable queue per (step, tier)
pub fn queue_name(step: PipelineStep, tier: Tier) -> String {
    format!("{}_queue_{}", step.as_str(), tier.as_str())
}

/// Extraction payload types carried in `JobEnvelope::message_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractionType {
    ProjectsAndIssueTypes,
    StatusesAndRelationships,
    IssuesWithChangelogs,
    DevStatus,
    CustomFields,
    SpecialFields,
}

impl ExtractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionType::ProjectsAndIssueTypes => "jira_projects_and_issue_types",
            ExtractionType::StatusesAndRelationships => "jira_statuses_and_relationships",
            ExtractionType::IssuesWithChangelogs => "jira_issues_with_changelogs",
            ExtractionType::DevStatus => "jira_dev_status",
            ExtractionType::CustomFields => "jira_custom_fields",
            ExtractionType::SpecialFields => "jira_special_fields",
        }
    }

    pub fn parse(s: &str) -> Option<ExtractionType> {
        match s {
            "jira_projects_and_issue_types" => Some(ExtractionType::ProjectsAndIssueTypes),
            "jira_statuses_and_relationships" => Some(ExtractionType::StatusesAndRelationships),
            "jira_issues_with_changelogs" => Some(ExtractionType::IssuesWithChangelogs),
            "jira_dev_status" => Some(ExtractionType::DevStatus),
            "jira_custom_fields" => Some(ExtractionType::CustomFields),
            "jira_special_fields" => Some(ExtractionType::SpecialFields),
            _ => None,
        }
    }
}

/// Batch-position flags within a step, plus the job-terminal flag.
///
/// `first_item` and `last_item` each appear on exactly one message per step
/// per job; `last_job_item` appears on exactly one message across the job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFlags {
    pub first_item: bool,
    pub last_item: bool,
    pub last_job_item: bool,
}

impl BatchFlags {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn first() -> Self {
        Self {
            first_item: true,
            ..Self::default()
        }
    }

    pub fn last() -> Self {
        Self {
            last_item: true,
            ..Self::default()
        }
    }

    /// Single-message step: the one message is both first and last
    pub fn only() -> Self {
        Self {
            first_item: true,
            last_item: true,
            last_job_item: false,
        }
    }

    /// Flags for position `index` in a batch of `len` messages
    pub fn for_position(index: usize, len: usize) -> Self {
        Self {
            first_item: index == 0,
            last_item: index + 1 == len,
            last_job_item: false,
        }
    }

    pub fn with_job_end(mut self, last_job_item: bool) -> Self {
        self.last_job_item = last_job_item;
        self
    }
}

/// Dispatch view of an envelope body.
///
/// Transformers match on this before touching storage: markers carry flags
/// only and must never be looked up in the relational store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageBody<'a> {
    Entity {
        raw_data_id: i64,
        external_id: Option<&'a str>,
    },
    Marker,
}

/// Canonical pipeline message envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobEnvelope {
    pub tenant_id: i64,
    pub integration_id: i64,
    /// Job-schedule id driving this run
    pub job_id: i64,
    /// Job-execution nonce, propagated end-to-end for status correlation
    pub token: Uuid,
    /// Payload type, e.g. "jira_issues_with_changelogs"
    #[serde(rename = "type")]
    pub message_type: String,
    pub provider: String,
    /// None on flag/completion markers
    pub raw_data_id: Option<i64>,
    /// None on flag/completion markers
    pub external_id: Option<String>,
    pub first_item: bool,
    pub last_item: bool,
    pub last_job_item: bool,
    pub old_last_sync_date: Option<DateTime<Utc>>,
    pub new_last_sync_date: Option<DateTime<Utc>>,
    /// Delivery attempt counter maintained by the retry middleware
    #[serde(default)]
    pub retry_count: u32,
}

impl JobEnvelope {
    /// Envelope carrying an entity payload
    #[allow(clippy::too_many_arguments)]
    pub fn entity(
        tenant_id: i64,
        integration_id: i64,
        job_id: i64,
        token: Uuid,
        message_type: ExtractionType,
        raw_data_id: i64,
        external_id: Option<String>,
        flags: BatchFlags,
    ) -> Self {
        Self {
            tenant_id,
            integration_id,
            job_id,
            token,
            message_type: message_type.as_str().to_string(),
            provider: "jira".to_string(),
            raw_data_id: Some(raw_data_id),
            external_id,
            first_item: flags.first_item,
            last_item: flags.last_item,
            last_job_item: flags.last_job_item,
            old_last_sync_date: None,
            new_last_sync_date: None,
            retry_count: 0,
        }
    }

    /// Flag/completion marker: empty body, flags only
    pub fn marker(
        tenant_id: i64,
        integration_id: i64,
        job_id: i64,
        token: Uuid,
        message_type: ExtractionType,
        flags: BatchFlags,
    ) -> Self {
        Self {
            tenant_id,
            integration_id,
            job_id,
            token,
            message_type: message_type.as_str().to_string(),
            provider: "jira".to_string(),
            raw_data_id: None,
            external_id: None,
            first_item: flags.first_item,
            last_item: flags.last_item,
            last_job_item: flags.last_job_item,
            old_last_sync_date: None,
            new_last_sync_date: None,
            retry_count: 0,
        }
    }

    pub fn with_sync_window(
        mut self,
        old_last_sync_date: Option<DateTime<Utc>>,
        new_last_sync_date: Option<DateTime<Utc>>,
    ) -> Self {
        self.old_last_sync_date = old_last_sync_date;
        self.new_last_sync_date = new_last_sync_date;
        self
    }

    /// Sum-type view used by the transform dispatcher
    pub fn body(&self) -> MessageBody<'_> {
        match self.raw_data_id {
            Some(raw_data_id) => MessageBody::Entity {
                raw_data_id,
                external_id: self.external_id.as_deref(),
            },
            None => MessageBody::Marker,
        }
    }

    pub fn flags(&self) -> BatchFlags {
        BatchFlags {
            first_item: self.first_item,
            last_item: self.last_item,
            last_job_item: self.last_job_item,
        }
    }

    /// Copy of this envelope with the same correlation fields but a new body,
    /// used when forwarding markers downstream.
    pub fn forward_marker(&self) -> Self {
        let mut fwd = self.clone();
        fwd.raw_data_id = None;
        fwd.external_id = None;
        fwd.retry_count = 0;
        fwd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(raw_data_id: Option<i64>) -> JobEnvelope {
        JobEnvelope {
            tenant_id: 1,
            integration_id: 2,
            job_id: 3,
            token: Uuid::new_v4(),
            message_type: "jira_issues_with_changelogs".to_string(),
            provider: "jira".to_string(),
            raw_data_id,
            external_id: raw_data_id.map(|_| "100".to_string()),
            first_item: true,
            last_item: false,
            last_job_item: false,
            old_last_sync_date: None,
            new_last_sync_date: None,
            retry_count: 0,
        }
    }

    #[test]
    fn test_queue_name_routing() {
        assert_eq!(
            queue_name(PipelineStep::Extraction, Tier::Premium),
            "extraction_queue_premium"
        );
        assert_eq!(
            queue_name(PipelineStep::Transform, Tier::Free),
            "transform_queue_free"
        );
        assert_eq!(
            queue_name(PipelineStep::Embedding, Tier::Enterprise),
            "embedding_queue_enterprise"
        );
    }

    #[test]
    fn test_body_dispatch() {
        match envelope(Some(42)).body() {
            MessageBody::Entity {
                raw_data_id,
                external_id,
            } => {
                assert_eq!(raw_data_id, 42);
                assert_eq!(external_id, Some("100"));
            }
            MessageBody::Marker => panic!("expected entity"),
        }
        assert_eq!(envelope(None).body(), MessageBody::Marker);
    }

    #[test]
    fn test_marker_round_trip_keeps_null_body() {
        let marker = JobEnvelope::marker(
            1,
            2,
            3,
            Uuid::new_v4(),
            ExtractionType::DevStatus,
            BatchFlags::only().with_job_end(true),
        );
        let json = serde_json::to_value(&marker).unwrap();
        assert!(json["raw_data_id"].is_null());
        assert!(json["external_id"].is_null());
        assert_eq!(json["type"], "jira_dev_status");

        let parsed: JobEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.body(), MessageBody::Marker);
        assert!(parsed.first_item && parsed.last_item && parsed.last_job_item);
    }

    #[test]
    fn test_position_flags() {
        assert_eq!(BatchFlags::for_position(0, 1), BatchFlags::only());
        let first = BatchFlags::for_position(0, 3);
        assert!(first.first_item && !first.last_item);
        let last = BatchFlags::for_position(2, 3);
        assert!(!last.first_item && last.last_item && !last.last_job_item);
    }

    #[test]
    fn test_forward_marker_strips_body() {
        let env = envelope(Some(7));
        let fwd = env.forward_marker();
        assert_eq!(fwd.body(), MessageBody::Marker);
        assert_eq!(fwd.flags(), env.flags());
        assert_eq!(fwd.token, env.token);
    }

    #[test]
    fn test_retry_count_defaults_when_absent() {
        let json = serde_json::json!({
            "tenant_id": 1, "integration_id": 2, "job_id": 3,
            "token": Uuid::new_v4(),
            "type": "jira_dev_status", "provider": "jira",
            "raw_data_id": null, "external_id": null,
            "first_item": false, "last_item": true, "last_job_item": true,
            "old_last_sync_date": null, "new_last_sync_date": null
        });
        let parsed: JobEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.retry_count, 0);
    }
}
