// Sync control entry point.
//
// run_sync marks the schedule RUNNING, dispatches to the extractors for the
// requested mode and settles the schedule state machine on the way out:
// FINISHED (cycle advanced), FAILED (truncated error), or
// RATE_LIMIT_REACHED (parked until the provider's reset instant).

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use workpulse_core::status_doc::steps;
use workpulse_core::{PipelineError, Result, Tier, WorkerConfig};
use workpulse_jira::JiraClient;
use workpulse_storage::{Database, EncryptionService};

use crate::extract::dev_status::extract_dev_status;
use crate::extract::issues::extract_issues;
use crate::extract::reference::{extract_field_catalogs, extract_projects_and_statuses};
use crate::extract::{effective_jql, ExtractionContext};
use crate::queue::QueueManager;
use crate::status::StatusEmitter;

/// What a sync run should cover
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    IssueTypes,
    Statuses,
    Issues,
    CustomQuery,
    All,
}

impl ExecutionMode {
    pub fn parse(s: &str) -> Option<ExecutionMode> {
        match s.trim().to_lowercase().as_str() {
            "issuetypes" => Some(ExecutionMode::IssueTypes),
            "statuses" => Some(ExecutionMode::Statuses),
            "issues" => Some(ExecutionMode::Issues),
            "custom_query" => Some(ExecutionMode::CustomQuery),
            "all" => Some(ExecutionMode::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::IssueTypes => "issuetypes",
            ExecutionMode::Statuses => "statuses",
            ExecutionMode::Issues => "issues",
            ExecutionMode::CustomQuery => "custom_query",
            ExecutionMode::All => "all",
        }
    }

    fn step_names(&self) -> Vec<&'static str> {
        match self {
            ExecutionMode::IssueTypes | ExecutionMode::Statuses => vec![steps::REFERENCE_DATA],
            ExecutionMode::Issues | ExecutionMode::CustomQuery => {
                vec![steps::ISSUES, steps::DEV_STATUS]
            }
            ExecutionMode::All => vec![steps::REFERENCE_DATA, steps::ISSUES, steps::DEV_STATUS],
        }
    }
}

/// Queued sync request consumed by the extraction workers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub job_schedule_id: i64,
    pub execution_mode: String,
    #[serde(default)]
    pub custom_query: Option<String>,
    #[serde(default)]
    pub target_projects: Vec<String>,
}

/// Control-plane result of one sync run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncOutcome {
    pub success: bool,
    pub issues_processed: usize,
    pub changelogs_processed: usize,
    pub pr_links_created: usize,
    pub error: Option<String>,
}

/// Shared dependencies for sync runs
#[derive(Clone)]
pub struct SyncDeps {
    pub db: Database,
    pub queues: QueueManager,
    pub status: StatusEmitter,
    pub encryption: EncryptionService,
    pub config: WorkerConfig,
}

/// Truncate to the minute for sync-window bookkeeping
pub fn truncate_to_minute(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(instant)
}

pub async fn run_sync(
    deps: &SyncDeps,
    job_schedule_id: i64,
    mode: ExecutionMode,
    custom_query: Option<String>,
    target_projects: Vec<String>,
) -> SyncOutcome {
    match run_sync_inner(deps, job_schedule_id, mode, custom_query, target_projects).await {
        Ok(outcome) => outcome,
        Err(err) => SyncOutcome {
            success: false,
            error: Some(err.to_string()),
            ..SyncOutcome::default()
        },
    }
}

async fn run_sync_inner(
    deps: &SyncDeps,
    job_schedule_id: i64,
    mode: ExecutionMode,
    custom_query: Option<String>,
    target_projects: Vec<String>,
) -> Result<SyncOutcome> {
    let schedule = deps
        .db
        .get_job_schedule(job_schedule_id)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?
        .ok_or_else(|| {
            PipelineError::config(format!("job schedule {job_schedule_id} not found"))
        })?;

    let integration = deps
        .db
        .get_integration(schedule.integration_id)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?
        .ok_or_else(|| {
            PipelineError::config(format!("integration {} not found", schedule.integration_id))
        })?;

    let tenant = deps
        .db
        .get_tenant(schedule.tenant_id)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?
        .ok_or_else(|| PipelineError::config(format!("tenant {} not found", schedule.tenant_id)))?;
    let tier = Tier::parse(&tenant.tier).unwrap_or(Tier::Free);

    let run_started = Utc::now();
    deps.db
        .mark_job_running(job_schedule_id, run_started)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;
    deps.status
        .start_job(schedule.tenant_id, job_schedule_id, &mode.step_names())
        .await?;

    // Credentials are decrypted per run, never cached across workers
    let credentials = deps
        .encryption
        .decrypt_column(&integration.credentials)
        .map_err(|e| PipelineError::config(format!("credential decryption failed: {e}")))?;
    let client = JiraClient::new(
        &integration.base_url,
        &credentials.username,
        &credentials.api_token,
        Duration::from_secs(deps.config.request_timeout_secs),
    )?;

    let ctx = ExtractionContext {
        db: deps.db.clone(),
        queues: deps.queues.clone(),
        client,
        status: deps.status.clone(),
        config: deps.config.clone(),
        tenant_id: schedule.tenant_id,
        tier,
        integration_id: integration.id,
        job_id: job_schedule_id,
        token: Uuid::new_v4(),
        old_last_sync_date: schedule.last_success_at,
        new_last_sync_date: truncate_to_minute(run_started),
    };

    let executed = execute_mode(
        &ctx,
        mode,
        integration.base_search_filter.as_deref(),
        custom_query.as_deref(),
        &target_projects,
    )
    .await;

    match executed {
        Ok(outcome) => {
            deps.db
                .mark_job_finished(job_schedule_id, truncate_to_minute(run_started))
                .await
                .map_err(|e| PipelineError::storage(e.to_string()))?;
            Ok(outcome)
        }
        Err(PipelineError::RateLimited { reset_at }) => {
            // No retry, no dead letter; resume when the provider says so
            let next_run = reset_at.unwrap_or_else(|| Utc::now() + chrono::Duration::minutes(1));
            deps.db
                .mark_job_rate_limited(job_schedule_id, next_run)
                .await
                .map_err(|e| PipelineError::storage(e.to_string()))?;
            Ok(SyncOutcome {
                success: false,
                error: Some(format!("rate limit reached, next run at {next_run}")),
                ..SyncOutcome::default()
            })
        }
        Err(err) => {
            let message = err.to_string();
            deps.db
                .update_job_checkpoint(
                    job_schedule_id,
                    &serde_json::json!({
                        "mode": mode.as_str(),
                        "failed_at": Utc::now(),
                        "error": message,
                    }),
                )
                .await
                .map_err(|e| PipelineError::storage(e.to_string()))?;
            deps.db
                .mark_job_failed(job_schedule_id, &message)
                .await
                .map_err(|e| PipelineError::storage(e.to_string()))?;
            deps.status
                .fail_job(schedule.tenant_id, job_schedule_id)
                .await?;
            Ok(SyncOutcome {
                success: false,
                error: Some(message),
                ..SyncOutcome::default()
            })
        }
    }
}

async fn execute_mode(
    ctx: &ExtractionContext,
    mode: ExecutionMode,
    base_search_filter: Option<&str>,
    custom_query: Option<&str>,
    target_projects: &[String],
) -> Result<SyncOutcome> {
    let mut outcome = SyncOutcome {
        success: true,
        ..SyncOutcome::default()
    };

    match mode {
        ExecutionMode::IssueTypes => {
            // The field catalogs extend the reference step and own both its
            // close and the job end
            extract_projects_and_statuses(ctx, target_projects, true, false).await?;
            extract_field_catalogs(ctx, target_projects, false, true).await?;
        }
        ExecutionMode::Statuses => {
            extract_projects_and_statuses(ctx, target_projects, false, true).await?;
        }
        ExecutionMode::Issues | ExecutionMode::CustomQuery | ExecutionMode::All => {
            if mode == ExecutionMode::All {
                extract_projects_and_statuses(ctx, target_projects, false, false).await?;
            }

            let jql = match (mode, custom_query) {
                (ExecutionMode::CustomQuery, Some(query)) => query.to_string(),
                _ => effective_jql(base_search_filter, ctx.old_last_sync_date, Utc::now()),
            };

            let issues = extract_issues(ctx, &jql, true).await?;
            outcome.issues_processed = issues.issues_emitted;
            outcome.changelogs_processed = issues.changelog_entries_seen;

            let dev = extract_dev_status(ctx, &issues.dev_status_candidates).await?;
            outcome.pr_links_created = dev.pr_entries_seen;
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_mode_parsing() {
        assert_eq!(ExecutionMode::parse("all"), Some(ExecutionMode::All));
        assert_eq!(ExecutionMode::parse("ISSUES"), Some(ExecutionMode::Issues));
        assert_eq!(
            ExecutionMode::parse("custom_query"),
            Some(ExecutionMode::CustomQuery)
        );
        assert_eq!(ExecutionMode::parse("everything"), None);
        for mode in [
            ExecutionMode::IssueTypes,
            ExecutionMode::Statuses,
            ExecutionMode::Issues,
            ExecutionMode::CustomQuery,
            ExecutionMode::All,
        ] {
            assert_eq!(ExecutionMode::parse(mode.as_str()), Some(mode));
        }
    }

    #[test]
    fn test_truncate_to_minute() {
        let instant = Utc.with_ymd_and_hms(2024, 5, 1, 9, 41, 37).unwrap()
            + chrono::Duration::milliseconds(250);
        let truncated = truncate_to_minute(instant);
        assert_eq!(
            truncated,
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 41, 0).unwrap()
        );
    }

    #[test]
    fn test_step_names_per_mode() {
        assert_eq!(
            ExecutionMode::All.step_names(),
            vec![steps::REFERENCE_DATA, steps::ISSUES, steps::DEV_STATUS]
        );
        assert_eq!(
            ExecutionMode::Statuses.step_names(),
            vec![steps::REFERENCE_DATA]
        );
        assert_eq!(
            ExecutionMode::Issues.step_names(),
            vec![steps::ISSUES, steps::DEV_STATUS]
        );
    }

    #[test]
    fn test_sync_request_round_trip() {
        let request = SyncRequest {
            job_schedule_id: 7,
            execution_mode: "all".to_string(),
            custom_query: None,
            target_projects: vec!["P1".to_string()],
        };
        let json = serde_json::to_value(&request).unwrap();
        let parsed: SyncRequest = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.job_schedule_id, 7);
        assert_eq!(parsed.target_projects, vec!["P1".to_string()]);
    }
}
