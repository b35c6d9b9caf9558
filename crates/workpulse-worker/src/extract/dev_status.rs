// Dev-status extraction for issues with code activity.
//
// The final dev-status emission carries last_job_item. A rate limit stops
// the worker immediately; the caller parks the job schedule instead of
// retrying or dead-lettering.

use serde_json::{json, Value};

use workpulse_core::{BatchFlags, ExtractionType, Result, StageState};
use workpulse_core::status_doc::steps;

use crate::extract::issues::DevStatusCandidate;
use crate::extract::ExtractionContext;
use crate::status::Stage;

#[derive(Debug, Default)]
pub struct DevStatusOutcome {
    pub persisted: usize,
    pub skipped_empty: usize,
    pub pr_entries_seen: usize,
}

pub async fn extract_dev_status(
    ctx: &ExtractionContext,
    candidates: &[DevStatusCandidate],
) -> Result<DevStatusOutcome> {
    let mut outcome = DevStatusOutcome::default();
    if candidates.is_empty() {
        return Ok(outcome);
    }

    ctx.status
        .set_stage(
            ctx.tenant_id,
            ctx.job_id,
            steps::DEV_STATUS,
            Stage::Extraction,
            StageState::Running,
        )
        .await?;

    for (index, candidate) in candidates.iter().enumerate() {
        let is_last = index + 1 == candidates.len();

        let payload = ctx.client.dev_status(&candidate.issue_id).await?;
        let payload = payload.filter(has_useful_dev_status_data);

        match payload {
            Some(dev_status) => {
                outcome.pr_entries_seen += count_pull_requests(&dev_status);
                let flags = BatchFlags {
                    first_item: outcome.persisted == 0,
                    last_item: is_last,
                    last_job_item: is_last,
                };
                ctx.persist_and_publish(
                    ExtractionType::DevStatus,
                    json!({
                        "issue_id": candidate.issue_id,
                        "issue_key": candidate.issue_key,
                        "dev_status": dev_status,
                    }),
                    Some(candidate.issue_id.clone()),
                    flags,
                )
                .await?;
                outcome.persisted += 1;
            }
            None => {
                outcome.skipped_empty += 1;
                tracing::debug!(issue_key = %candidate.issue_key, "no useful dev-status data");
                if is_last {
                    // Nothing to persist, but the job end must still travel
                    ctx.publish_marker(
                        ExtractionType::DevStatus,
                        BatchFlags {
                            first_item: outcome.persisted == 0,
                            last_item: true,
                            last_job_item: true,
                        },
                    )
                    .await?;
                }
            }
        }
    }

    ctx.status
        .set_stage(
            ctx.tenant_id,
            ctx.job_id,
            steps::DEV_STATUS,
            Stage::Extraction,
            StageState::Finished,
        )
        .await?;

    Ok(outcome)
}

/// A dev-status payload is useful when any detail entry carries at least one
/// repository, pull request or branch.
pub fn has_useful_dev_status_data(payload: &Value) -> bool {
    let Some(details) = payload.get("detail").and_then(Value::as_array) else {
        return false;
    };
    details.iter().any(|detail| {
        ["repositories", "pullRequests", "branches"].iter().any(|kind| {
            detail
                .get(*kind)
                .and_then(Value::as_array)
                .map(|entries| !entries.is_empty())
                .unwrap_or(false)
        })
    })
}

fn count_pull_requests(payload: &Value) -> usize {
    payload
        .get("detail")
        .and_then(Value::as_array)
        .map(|details| {
            details
                .iter()
                .filter_map(|d| d.get("pullRequests").and_then(Value::as_array))
                .map(|prs| prs.len())
                .sum()
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_detail_is_not_useful() {
        let payload = json!({
            "detail": [{"pullRequests": [], "branches": [], "repositories": []}]
        });
        assert!(!has_useful_dev_status_data(&payload));
        assert!(!has_useful_dev_status_data(&json!({})));
    }

    #[test]
    fn test_any_activity_is_useful() {
        let with_prs = json!({"detail": [{"pullRequests": [{"id": "#1"}]}]});
        assert!(has_useful_dev_status_data(&with_prs));

        let with_branches = json!({"detail": [
            {"pullRequests": []},
            {"branches": [{"name": "feature/x"}]}
        ]});
        assert!(has_useful_dev_status_data(&with_branches));
    }

    #[test]
    fn test_pull_request_count() {
        let payload = json!({"detail": [
            {"pullRequests": [{"id": "#1"}, {"id": "#2"}]},
            {"pullRequests": [{"id": "#3"}]}
        ]});
        assert_eq!(count_pull_requests(&payload), 3);
    }
}
