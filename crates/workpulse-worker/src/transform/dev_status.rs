// Dev-status transformer: PR-link extraction and insert-only persistence.

use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::OnceLock;

use workpulse_core::{JobEnvelope, PipelineError, Result};
use workpulse_storage::{BulkOperations, RawExtractionDataRow, SqlValue};

use crate::transform::TransformContext;

/// PR link candidate parsed from a dev-status payload
#[derive(Debug, Clone, PartialEq)]
pub struct PrLinkCandidate {
    pub external_repo_id: String,
    pub repo_full_name: String,
    pub pull_request_number: i32,
    pub branch_name: Option<String>,
    pub commit_sha: Option<String>,
    pub pr_status: Option<String>,
}

fn digits_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)").expect("static regex"))
}

fn pull_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/pull/(\d+)").expect("static regex"))
}

/// PR-number precedence: explicit numeric field, integer id, first digit run
/// in id then name, then /pull/(\d+) in the URL. No hit drops the entry.
fn parse_pr_number(pr: &Value) -> Option<i32> {
    if let Some(number) = pr.get("pullRequestNumber").and_then(Value::as_i64) {
        return i32::try_from(number).ok();
    }
    if let Some(id) = pr.get("id").and_then(Value::as_i64) {
        return i32::try_from(id).ok();
    }
    for key in ["id", "name"] {
        if let Some(raw) = pr.get(key).and_then(Value::as_str) {
            if let Some(captures) = digits_regex().captures(raw) {
                if let Ok(number) = captures[1].parse::<i32>() {
                    return Some(number);
                }
            }
        }
    }
    let url = pr.get("url").and_then(Value::as_str)?;
    pull_url_regex()
        .captures(url)?
        .get(1)?
        .as_str()
        .parse::<i32>()
        .ok()
}

/// Repository full name ("owner/repo"): explicit field first, then the URL
/// path segments in front of /pull/.
fn parse_repo_full_name(pr: &Value) -> Option<String> {
    if let Some(name) = pr.get("repositoryName").and_then(Value::as_str) {
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }
    let url = pr.get("url").and_then(Value::as_str)?;
    let parts: Vec<&str> = url.split('/').collect();
    let pull_pos = parts.iter().position(|p| *p == "pull")?;
    if pull_pos >= 2 {
        Some(format!("{}/{}", parts[pull_pos - 2], parts[pull_pos - 1]))
    } else {
        None
    }
}

/// Walk dev_status.detail[*].pullRequests[*]; entries missing repo identity
/// or a parseable PR number are dropped.
pub fn extract_pr_links(dev_status: &Value) -> Vec<PrLinkCandidate> {
    let Some(details) = dev_status.get("detail").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut links = Vec::new();
    for detail in details {
        let Some(pull_requests) = detail.get("pullRequests").and_then(Value::as_array) else {
            continue;
        };
        for pr in pull_requests {
            let Some(repo_full_name) = parse_repo_full_name(pr) else {
                tracing::debug!("PR entry without repository name dropped");
                continue;
            };
            let external_repo_id = pr
                .get("repositoryId")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| repo_full_name.clone());
            let Some(pull_request_number) = parse_pr_number(pr) else {
                tracing::debug!("PR entry without parseable number dropped");
                continue;
            };

            links.push(PrLinkCandidate {
                external_repo_id,
                repo_full_name,
                pull_request_number,
                branch_name: pr
                    .get("source")
                    .and_then(|s| s.get("branch"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                commit_sha: pr
                    .get("lastCommit")
                    .and_then(|c| c.get("id"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                pr_status: pr.get("status").and_then(Value::as_str).map(str::to_string),
            });
        }
    }
    links
}

/// Insert new PR links for one issue and fan each inserted link out to the
/// embedding queue. Zero inserts with boundary flags still forward a marker.
pub async fn transform_dev_status(
    ctx: &TransformContext,
    envelope: &JobEnvelope,
    raw: &RawExtractionDataRow,
) -> Result<()> {
    let issue_external_id = raw
        .raw_data
        .get("issue_id")
        .and_then(Value::as_str)
        .ok_or_else(|| PipelineError::bad_data("dev-status payload missing issue_id"))?
        .to_string();
    let dev_status = raw
        .raw_data
        .get("dev_status")
        .cloned()
        .ok_or_else(|| PipelineError::bad_data("dev-status payload missing dev_status"))?;

    let work_items = ctx
        .db
        .work_item_ids_by_external(
            envelope.integration_id,
            std::slice::from_ref(&issue_external_id),
        )
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;
    let Some(work_item_id) = work_items.get(&issue_external_id).copied() else {
        // The issue transform may not have committed yet; retry later
        return Err(PipelineError::transform(format!(
            "work item {issue_external_id} not found for dev-status"
        )));
    };

    let candidates = extract_pr_links(&dev_status);
    let known = ctx
        .db
        .existing_pr_link_keys(&[work_item_id])
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;

    let mut seen_in_batch: HashSet<(String, i32)> = HashSet::new();
    let mut new_links = Vec::new();
    for candidate in candidates {
        let key = (
            work_item_id,
            candidate.external_repo_id.clone(),
            candidate.pull_request_number,
        );
        if known.contains(&key)
            || !seen_in_batch.insert((candidate.external_repo_id.clone(), candidate.pull_request_number))
        {
            continue;
        }
        new_links.push(candidate);
    }

    if !new_links.is_empty() {
        let mut tx = ctx
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| PipelineError::storage(e.to_string()))?;

        let rows: Vec<Vec<SqlValue>> = new_links
            .iter()
            .map(|link| {
                vec![
                    SqlValue::I64(envelope.tenant_id),
                    SqlValue::I64(envelope.integration_id),
                    SqlValue::I64(work_item_id),
                    SqlValue::text(&link.external_repo_id),
                    SqlValue::text(&link.repo_full_name),
                    SqlValue::I32(link.pull_request_number),
                    SqlValue::opt_text(link.branch_name.clone()),
                    SqlValue::opt_text(link.commit_sha.clone()),
                    SqlValue::opt_text(link.pr_status.clone()),
                ]
            })
            .collect();

        BulkOperations::bulk_insert_relationships(
            &mut *tx,
            "work_items_prs_links",
            &[
                "tenant_id",
                "integration_id",
                "work_item_id",
                "external_repo_id",
                "repo_full_name",
                "pull_request_number",
                "branch_name",
                "commit_sha",
                "pr_status",
            ],
            &["work_item_id", "external_repo_id", "pull_request_number"],
            rows,
            ctx.config.batch_size,
        )
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| PipelineError::storage(e.to_string()))?;
    }

    if new_links.is_empty() {
        if envelope.first_item || envelope.last_item || envelope.last_job_item {
            let marker = envelope.forward_marker();
            if !ctx.queues.publish_embedding_job(ctx.tier, &marker).await {
                return Err(PipelineError::queue("embedding marker publish failed"));
            }
        }
        return Ok(());
    }

    let total = new_links.len();
    for (index, link) in new_links.iter().enumerate() {
        let mut embedding = envelope.clone();
        embedding.retry_count = 0;
        embedding.external_id = Some(format!(
            "{}#{}",
            link.external_repo_id, link.pull_request_number
        ));
        embedding.first_item = envelope.first_item && index == 0;
        embedding.last_item = envelope.last_item && index + 1 == total;
        embedding.last_job_item = envelope.last_job_item && index + 1 == total;

        if !ctx.queues.publish_embedding_job(ctx.tier, &embedding).await {
            return Err(PipelineError::queue("embedding publish failed"));
        }
    }

    tracing::info!(
        issue = %issue_external_id,
        inserted = total,
        "dev-status transformed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pr_number_precedence() {
        // Explicit field wins
        assert_eq!(
            parse_pr_number(&json!({"pullRequestNumber": 7, "id": "#99"})),
            Some(7)
        );
        // Integer id next
        assert_eq!(parse_pr_number(&json!({"id": 42})), Some(42));
        // Digit run in the string id
        assert_eq!(parse_pr_number(&json!({"id": "#123"})), Some(123));
        // Then the name
        assert_eq!(parse_pr_number(&json!({"id": "#", "name": "PR 55"})), Some(55));
        // URL is the last resort
        assert_eq!(
            parse_pr_number(&json!({"url": "https://github.com/acme/api/pull/321"})),
            Some(321)
        );
        assert_eq!(parse_pr_number(&json!({"name": "no digits"})), None);
    }

    #[test]
    fn test_repo_name_from_field_or_url() {
        assert_eq!(
            parse_repo_full_name(&json!({"repositoryName": "acme/api"})),
            Some("acme/api".to_string())
        );
        assert_eq!(
            parse_repo_full_name(&json!({"url": "https://github.com/acme/api/pull/1"})),
            Some("acme/api".to_string())
        );
        assert_eq!(parse_repo_full_name(&json!({"name": "#1"})), None);
    }

    #[test]
    fn test_extract_pr_links_requires_repo_identity() {
        let dev_status = json!({"detail": [{"pullRequests": [
            {
                "id": "#12",
                "url": "https://github.com/acme/api/pull/12",
                "status": "MERGED",
                "repositoryId": "repo-1",
                "repositoryName": "acme/api",
                "source": {"branch": "feature/x"},
                "lastCommit": {"id": "abc123"}
            },
            {"id": "#13", "status": "OPEN"}
        ]}]});
        let links = extract_pr_links(&dev_status);

        assert_eq!(links.len(), 1);
        let link = &links[0];
        assert_eq!(link.external_repo_id, "repo-1");
        assert_eq!(link.repo_full_name, "acme/api");
        assert_eq!(link.pull_request_number, 12);
        assert_eq!(link.branch_name.as_deref(), Some("feature/x"));
        assert_eq!(link.commit_sha.as_deref(), Some("abc123"));
        assert_eq!(link.pr_status.as_deref(), Some("MERGED"));
    }

    #[test]
    fn test_extract_pr_links_empty_detail() {
        let empty = json!({"detail": [{"pullRequests": [], "branches": [], "repositories": []}]});
        assert!(extract_pr_links(&empty).is_empty());
        assert!(extract_pr_links(&json!({})).is_empty());
    }
}
