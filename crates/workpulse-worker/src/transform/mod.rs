// Transform stage: route raw payloads to type-specific transformers and
// handle completion markers.
//
// Markers never touch the relational store: they forward their flags to the
// embedding queue so status tracking fires even for empty steps. Unknown
// message types are logged and dropped.

pub mod dev_status;
pub mod issues;
pub mod reference;
mod util;

use chrono::{DateTime, Utc};

use workpulse_core::status_doc::steps;
use workpulse_core::{
    ExtractionType, JobEnvelope, MessageBody, PipelineError, Result, StageState, Tier,
    WorkerConfig,
};
use workpulse_storage::{Database, RawExtractionDataRow};

use crate::queue::QueueManager;
use crate::status::{Stage, StatusEmitter};

#[derive(Clone)]
pub struct TransformContext {
    pub db: Database,
    pub queues: QueueManager,
    pub status: StatusEmitter,
    pub config: WorkerConfig,
    pub tier: Tier,
}

/// Status step a message type belongs to
pub fn step_for_type(extraction_type: ExtractionType) -> &'static str {
    match extraction_type {
        ExtractionType::ProjectsAndIssueTypes
        | ExtractionType::StatusesAndRelationships
        | ExtractionType::CustomFields
        | ExtractionType::SpecialFields => steps::REFERENCE_DATA,
        ExtractionType::IssuesWithChangelogs => steps::ISSUES,
        ExtractionType::DevStatus => steps::DEV_STATUS,
    }
}

/// Route one transform message. Errors bubble to the retry middleware; a
/// successful return means the message can be acked.
pub async fn dispatch(ctx: &TransformContext, envelope: &JobEnvelope) -> Result<()> {
    let Some(extraction_type) = ExtractionType::parse(&envelope.message_type) else {
        tracing::warn!(message_type = %envelope.message_type, "unknown message type dropped");
        return Ok(());
    };
    let step = step_for_type(extraction_type);

    match envelope.body() {
        MessageBody::Marker => handle_completion(ctx, envelope, step).await,
        MessageBody::Entity { raw_data_id, .. } => {
            if envelope.first_item {
                ctx.status
                    .set_stage(
                        envelope.tenant_id,
                        envelope.job_id,
                        step,
                        Stage::Transform,
                        StageState::Running,
                    )
                    .await?;
            }

            let raw = load_raw(ctx, raw_data_id).await?;
            let result = match extraction_type {
                ExtractionType::ProjectsAndIssueTypes => {
                    reference::transform_projects_and_issue_types(ctx, envelope, &raw).await
                }
                ExtractionType::StatusesAndRelationships => {
                    reference::transform_statuses_and_relationships(ctx, envelope, &raw).await
                }
                ExtractionType::CustomFields => {
                    reference::transform_custom_fields(ctx, envelope, &raw).await
                }
                ExtractionType::SpecialFields => {
                    reference::transform_special_fields(ctx, envelope, &raw).await
                }
                ExtractionType::IssuesWithChangelogs => {
                    issues::transform_issue(ctx, envelope, &raw).await
                }
                ExtractionType::DevStatus => {
                    dev_status::transform_dev_status(ctx, envelope, &raw).await
                }
            };

            match result {
                Ok(()) => {
                    ctx.db
                        .mark_raw_completed(raw.id)
                        .await
                        .map_err(|e| PipelineError::storage(e.to_string()))?;
                    if envelope.last_item {
                        ctx.status
                            .set_stage(
                                envelope.tenant_id,
                                envelope.job_id,
                                step,
                                Stage::Transform,
                                StageState::Finished,
                            )
                            .await?;
                    }
                    Ok(())
                }
                Err(PipelineError::BadData(reason)) => {
                    // Skip the record, keep the pipeline moving
                    tracing::warn!(raw_data_id, %reason, "bad payload skipped");
                    ctx.db
                        .mark_raw_failed(raw.id, &reason)
                        .await
                        .map_err(|e| PipelineError::storage(e.to_string()))?;
                    Ok(())
                }
                Err(other) => Err(other),
            }
        }
    }
}

/// Completion/flag marker: forward downstream with the same flags, never
/// touch the relational store.
async fn handle_completion(
    ctx: &TransformContext,
    envelope: &JobEnvelope,
    step: &str,
) -> Result<()> {
    let forwarded = envelope.forward_marker();
    if !ctx
        .queues
        .publish_embedding_job(ctx.tier, &forwarded)
        .await
    {
        return Err(PipelineError::queue("marker forward failed".to_string()));
    }

    if envelope.last_item {
        // An empty step finishes transform and embedding in one crossing
        ctx.status
            .set_stage(
                envelope.tenant_id,
                envelope.job_id,
                step,
                Stage::Transform,
                StageState::Finished,
            )
            .await?;
        ctx.status
            .set_stage(
                envelope.tenant_id,
                envelope.job_id,
                step,
                Stage::Embedding,
                StageState::Finished,
            )
            .await?;
    }
    Ok(())
}

async fn load_raw(ctx: &TransformContext, raw_data_id: i64) -> Result<RawExtractionDataRow> {
    ctx.db
        .get_raw_extraction(raw_data_id)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?
        .ok_or_else(|| {
            PipelineError::transform(format!("raw_extraction_data {raw_data_id} not found"))
        })
}

/// Parse the timestamp formats Jira emits: RFC 3339 and the legacy
/// `2024-01-15T10:30:00.000+0000` shape.
pub fn parse_jira_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.3f%z") {
        return Some(parsed.with_timezone(&Utc));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_step_routing() {
        assert_eq!(
            step_for_type(ExtractionType::ProjectsAndIssueTypes),
            steps::REFERENCE_DATA
        );
        assert_eq!(step_for_type(ExtractionType::IssuesWithChangelogs), steps::ISSUES);
        assert_eq!(step_for_type(ExtractionType::DevStatus), steps::DEV_STATUS);
    }

    #[test]
    fn test_parse_jira_datetime_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(parse_jira_datetime("2024-01-15T10:30:00Z"), Some(expected));
        assert_eq!(
            parse_jira_datetime("2024-01-15T10:30:00.000+0000"),
            Some(expected)
        );
        assert_eq!(parse_jira_datetime("not a date"), None);
    }
}
