// Incremental issue extraction.
//
// Streams pages of issues with embedded changelogs and fans out one raw row
// and one transform message per issue. Messages go out as soon as each issue
// is persisted, so a rate limit mid-run leaves everything already extracted
// flowing through the pipeline.

use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

use workpulse_core::{
    BatchFlags, ExtractionType, PipelineError, ProviderValue, Result, StageState,
};
use workpulse_core::status_doc::steps;

use crate::extract::ExtractionContext;
use crate::status::Stage;

/// Issue flagged for dev-status follow-up
#[derive(Debug, Clone)]
pub struct DevStatusCandidate {
    pub issue_id: String,
    pub issue_key: String,
}

#[derive(Debug, Default)]
pub struct IssueExtractionOutcome {
    pub issues_emitted: usize,
    pub issues_skipped: usize,
    pub changelog_entries_seen: usize,
    pub dev_status_candidates: Vec<DevStatusCandidate>,
}

/// Stream all issues matching `jql`. `terminal_step` marks this extraction as
/// the job's final step when no dev-status fan-out will follow; the actual
/// `last_job_item` placement is deferred until the candidate set is known.
pub async fn extract_issues(
    ctx: &ExtractionContext,
    jql: &str,
    terminal_step: bool,
) -> Result<IssueExtractionOutcome> {
    ctx.status
        .set_stage(
            ctx.tenant_id,
            ctx.job_id,
            steps::ISSUES,
            Stage::Extraction,
            StageState::Running,
        )
        .await?;

    // Development flag lives behind the integration's field mapping
    let development_field_id = ctx
        .db
        .field_projection_pairs(ctx.integration_id)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?
        .into_iter()
        .find(|(slot, _)| slot == "development")
        .map(|(_, external_id)| external_id);

    let expected_total = ctx.client.approximate_count(jql).await.unwrap_or(0);
    tracing::info!(jql, expected_total, "starting issue extraction");

    let deadline =
        Instant::now() + Duration::from_secs(ctx.config.fetch_loop_timeout_secs);

    let mut outcome = IssueExtractionOutcome::default();
    let mut next_page_token: Option<String> = None;
    let mut last_item_published = false;

    loop {
        if Instant::now() >= deadline {
            return Err(PipelineError::Timeout {
                seconds: ctx.config.fetch_loop_timeout_secs,
            });
        }

        let page = ctx
            .client
            .search_jql_page(jql, ctx.config.issue_page_size, next_page_token.as_deref())
            .await?;
        let is_final_page = page.is_final();

        // Candidates for this page are known before any message goes out, so
        // the final issue message can carry the job-end flag when no
        // dev-status stage will follow.
        let page_valid: Vec<&Value> = page
            .issues
            .iter()
            .filter(|issue| {
                let ok = issue.get("key").and_then(Value::as_str).is_some()
                    && issue.get("id").and_then(Value::as_str).is_some();
                if !ok {
                    tracing::warn!("issue without id/key skipped");
                }
                ok
            })
            .collect();
        outcome.issues_skipped += page.issues.len() - page_valid.len();

        for issue in &page_valid {
            if let Some(candidate) = dev_status_candidate(issue, development_field_id.as_deref())
            {
                outcome.dev_status_candidates.push(candidate);
            }
        }

        let page_len = page_valid.len();
        for (index, issue) in page_valid.iter().enumerate() {
            let external_id = issue
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let is_last_issue = is_final_page && index + 1 == page_len;

            let flags = BatchFlags {
                first_item: outcome.issues_emitted == 0,
                last_item: is_last_issue,
                last_job_item: is_last_issue
                    && terminal_step
                    && outcome.dev_status_candidates.is_empty(),
            };

            ctx.persist_and_publish(
                ExtractionType::IssuesWithChangelogs,
                (*issue).clone(),
                Some(external_id),
                flags,
            )
            .await?;

            outcome.issues_emitted += 1;
            outcome.changelog_entries_seen += count_status_histories(issue);
            if is_last_issue {
                last_item_published = true;
            }
        }

        if is_final_page {
            break;
        }
        next_page_token = page.next_page_token.clone();
    }

    if outcome.issues_emitted == 0 {
        // Zero issues: the step still completes downstream via a flag message
        ctx.publish_marker(
            ExtractionType::IssuesWithChangelogs,
            BatchFlags::only().with_job_end(terminal_step),
        )
        .await?;
    } else if !last_item_published {
        // The final page carried no valid issue; close the step explicitly
        ctx.publish_marker(
            ExtractionType::IssuesWithChangelogs,
            BatchFlags::last()
                .with_job_end(terminal_step && outcome.dev_status_candidates.is_empty()),
        )
        .await?;
    }

    ctx.status
        .set_stage(
            ctx.tenant_id,
            ctx.job_id,
            steps::ISSUES,
            Stage::Extraction,
            StageState::Finished,
        )
        .await?;

    Ok(outcome)
}

/// An issue is a dev-status candidate when its mapped development field holds
/// a non-empty value.
fn dev_status_candidate(
    issue: &Value,
    development_field_id: Option<&str>,
) -> Option<DevStatusCandidate> {
    let field_id = development_field_id?;
    let value = issue.get("fields")?.get(field_id)?;
    if !ProviderValue::from_json(value).indicates_activity() {
        return None;
    }
    Some(DevStatusCandidate {
        issue_id: issue.get("id")?.as_str()?.to_string(),
        issue_key: issue.get("key")?.as_str()?.to_string(),
    })
}

fn count_status_histories(issue: &Value) -> usize {
    issue
        .get("changelog")
        .and_then(|c| c.get("histories"))
        .and_then(Value::as_array)
        .map(|histories| {
            histories
                .iter()
                .filter(|history| {
                    history
                        .get("items")
                        .and_then(Value::as_array)
                        .map(|items| {
                            items.iter().any(|item| {
                                item.get("field").and_then(Value::as_str) == Some("status")
                            })
                        })
                        .unwrap_or(false)
                })
                .count()
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dev_status_candidate_detection() {
        let issue = json!({
            "id": "100",
            "key": "P-1",
            "fields": { "customfield_10000": "{pullrequest={dataType=pullrequest}}" }
        });
        let candidate = dev_status_candidate(&issue, Some("customfield_10000")).unwrap();
        assert_eq!(candidate.issue_id, "100");
        assert_eq!(candidate.issue_key, "P-1");

        let empty = json!({
            "id": "101", "key": "P-2",
            "fields": { "customfield_10000": "{}" }
        });
        assert!(dev_status_candidate(&empty, Some("customfield_10000")).is_none());
        assert!(dev_status_candidate(&issue, None).is_none());
    }

    #[test]
    fn test_count_status_histories_ignores_other_fields() {
        let issue = json!({
            "changelog": { "histories": [
                {"items": [{"field": "status"}]},
                {"items": [{"field": "assignee"}]},
                {"items": [{"field": "status"}, {"field": "labels"}]}
            ]}
        });
        assert_eq!(count_status_histories(&issue), 2);
        assert_eq!(count_status_histories(&json!({})), 0);
    }
}
