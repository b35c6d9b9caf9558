// Issue transformer: one raw issue payload (changelog embedded) per message.
//
// Skeleton shared with the other transformers: load payload, resolve
// existing rows by external_id, partition insert/update, bulk apply inside
// one write transaction, commit, then publish downstream.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use workpulse_core::{
    FieldProjection, JobEnvelope, PipelineError, ProviderValue, Result, StatusCategory,
    TargetColumn, TransitionRecord, WorkflowMetrics,
};
use workpulse_storage::{BulkOperations, RawExtractionDataRow, SqlValue};

use crate::transform::util::{id_map_tx, upsert_sprint_tx, IdTable};
use crate::transform::{parse_jira_datetime, TransformContext};

/// New changelog row derived from one status history entry
#[derive(Debug, Clone, PartialEq)]
pub struct NewChangelog {
    pub external_id: String,
    pub from_status_external_id: Option<String>,
    pub to_status_external_id: Option<String>,
    pub transition_start_date: DateTime<Utc>,
    pub transition_change_date: DateTime<Utc>,
    pub time_in_status_seconds: f64,
    pub changed_by: Option<String>,
}

/// Build the contiguous transition chain for one issue.
///
/// Histories are sorted ascending by creation time; only status items count.
/// The first transition starts at the work item's creation instant, each
/// subsequent one starts where the previous ended.
pub fn build_changelog_chain(created: DateTime<Utc>, histories: &[Value]) -> Vec<NewChangelog> {
    let mut status_histories: Vec<(DateTime<Utc>, &Value, &Value)> = histories
        .iter()
        .filter_map(|history| {
            let change_date = history
                .get("created")
                .and_then(Value::as_str)
                .and_then(parse_jira_datetime)?;
            let item = history
                .get("items")
                .and_then(Value::as_array)?
                .iter()
                .find(|item| item.get("field").and_then(Value::as_str) == Some("status"))?;
            Some((change_date, history, item))
        })
        .collect();
    status_histories.sort_by_key(|(change_date, _, _)| *change_date);

    let mut chain = Vec::with_capacity(status_histories.len());
    let mut start = created;
    for (change_date, history, item) in status_histories {
        let external_id = history
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if external_id.is_empty() {
            continue;
        }
        chain.push(NewChangelog {
            external_id,
            from_status_external_id: item
                .get("from")
                .and_then(Value::as_str)
                .map(str::to_string),
            to_status_external_id: item.get("to").and_then(Value::as_str).map(str::to_string),
            transition_start_date: start,
            transition_change_date: change_date,
            time_in_status_seconds: (change_date - start).num_milliseconds() as f64 / 1000.0,
            changed_by: history
                .get("author")
                .and_then(|a| a.get("displayName"))
                .and_then(Value::as_str)
                .map(str::to_string),
        });
        start = change_date;
    }
    chain
}

/// Sprint entry pulled from the mapped sprints field
#[derive(Debug, Clone, PartialEq)]
pub struct SprintData {
    pub external_id: String,
    pub board_id: Option<i64>,
    pub name: Option<String>,
    pub state: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
}

pub fn extract_sprints(value: &Value) -> Vec<SprintData> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let map = entry.as_object()?;
            let external_id = match map.get("id") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => return None,
            };
            Some(SprintData {
                external_id,
                board_id: map.get("boardId").and_then(Value::as_i64),
                name: map.get("name").and_then(Value::as_str).map(str::to_string),
                state: map.get("state").and_then(Value::as_str).map(str::to_string),
                start_date: map
                    .get("startDate")
                    .and_then(Value::as_str)
                    .and_then(parse_jira_datetime),
            })
        })
        .collect()
}

/// Dynamically assembled column set for one work item row
struct IssueColumns {
    columns: Vec<&'static str>,
    values: Vec<SqlValue>,
}

impl IssueColumns {
    fn new() -> Self {
        Self {
            columns: Vec::new(),
            values: Vec::new(),
        }
    }

    fn push(&mut self, column: &'static str, value: SqlValue) {
        self.columns.push(column);
        self.values.push(value);
    }
}

fn resolve_fk(
    map: &HashMap<String, i64>,
    fields: &Value,
    field: &str,
    entity: &str,
) -> Option<i64> {
    let external_id = fields.get(field)?.get("id")?.as_str()?;
    match map.get(external_id) {
        Some(id) => Some(*id),
        None => {
            // Unresolved references stay null; the record still lands
            tracing::warn!(entity, external_id, "unresolved reference left null");
            None
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build_issue_columns(
    fields: &Value,
    key: &str,
    projects: &HashMap<String, i64>,
    wits: &HashMap<String, i64>,
    statuses: &HashMap<String, i64>,
    projection: &FieldProjection,
    created: Option<DateTime<Utc>>,
    updated: Option<DateTime<Utc>>,
) -> IssueColumns {
    let mut row = IssueColumns::new();
    row.push("key", SqlValue::text(key));
    row.push(
        "summary",
        SqlValue::opt_text(fields.get("summary").and_then(Value::as_str).map(str::to_string)),
    );
    row.push(
        "description",
        SqlValue::opt_text(
            fields
                .get("description")
                .map(ProviderValue::from_json)
                .and_then(|v| v.document_text()),
        ),
    );
    row.push(
        "project_id",
        SqlValue::NullableI64(resolve_fk(projects, fields, "project", "project")),
    );
    row.push(
        "wit_id",
        SqlValue::NullableI64(resolve_fk(wits, fields, "issuetype", "wit")),
    );
    row.push(
        "status_id",
        SqlValue::NullableI64(resolve_fk(statuses, fields, "status", "status")),
    );
    row.push(
        "priority",
        SqlValue::opt_text(
            fields
                .get("priority")
                .and_then(|p| p.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string),
        ),
    );
    row.push(
        "resolution",
        SqlValue::opt_text(
            fields
                .get("resolution")
                .and_then(|r| r.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string),
        ),
    );
    row.push(
        "assignee",
        SqlValue::opt_text(
            fields
                .get("assignee")
                .and_then(|a| a.get("displayName"))
                .and_then(Value::as_str)
                .map(str::to_string),
        ),
    );
    row.push(
        "labels",
        SqlValue::opt_text(fields.get("labels").and_then(Value::as_array).map(|labels| {
            labels
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(",")
        })),
    );
    row.push(
        "parent_external_id",
        SqlValue::opt_text(
            fields
                .get("parent")
                .and_then(|p| p.get("id"))
                .and_then(Value::as_str)
                .map(str::to_string),
        ),
    );
    row.push("created", SqlValue::NullableTimestamp(created));
    row.push("updated", SqlValue::NullableTimestamp(updated));

    // Mapped custom fields; absent provider fields leave their columns alone
    for (provider_field_id, target) in projection.iter() {
        let raw = fields.get(provider_field_id);
        match target {
            TargetColumn::Sprints => {
                // Consumed by the sprint-association step, never a column
            }
            TargetColumn::Development => {
                let active = raw
                    .map(|v| ProviderValue::from_json(v).indicates_activity())
                    .unwrap_or(false);
                row.push("development", SqlValue::Bool(active));
            }
            TargetColumn::StoryPoints => {
                if let Some(value) = raw {
                    row.push(
                        "story_points",
                        SqlValue::NullableF64(ProviderValue::from_json(value).as_story_points()),
                    );
                }
            }
            TargetColumn::Team => {
                if let Some(value) = raw {
                    row.push(
                        "team",
                        SqlValue::opt_text(ProviderValue::from_json(value).team_name()),
                    );
                }
            }
            TargetColumn::Custom(_) => {
                if let (Some(value), Some(column)) = (raw, target.column_name()) {
                    row.push(
                        column,
                        SqlValue::opt_text(ProviderValue::from_json(value).display_text()),
                    );
                }
            }
        }
    }
    row
}

/// Transform one raw issue: upsert the work item, associate sprints, append
/// new changelog rows and refresh the derived workflow metrics.
pub async fn transform_issue(
    ctx: &TransformContext,
    envelope: &JobEnvelope,
    raw: &RawExtractionDataRow,
) -> Result<()> {
    let issue = &raw.raw_data;
    let external_id = issue
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| PipelineError::bad_data("issue payload missing id"))?
        .to_string();
    let key = issue
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| PipelineError::bad_data("issue payload missing key"))?
        .to_string();
    let fields = issue
        .get("fields")
        .cloned()
        .ok_or_else(|| PipelineError::bad_data("issue payload missing fields"))?;

    let tenant_id = envelope.tenant_id;
    let integration_id = envelope.integration_id;

    // One lookup query per table, resolved before the write transaction
    let projects = ctx
        .db
        .project_id_map(integration_id)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;
    let wits = ctx
        .db
        .wit_id_map(integration_id)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;
    let statuses = ctx
        .db
        .status_id_map(integration_id)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;
    let categories: HashMap<i64, StatusCategory> = ctx
        .db
        .status_category_map(integration_id)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?
        .into_iter()
        .filter_map(|(id, raw)| StatusCategory::parse(&raw).map(|c| (id, c)))
        .collect();

    let mut projection = FieldProjection::new();
    for (slot, provider_field_id) in ctx
        .db
        .field_projection_pairs(integration_id)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?
    {
        if let Some(target) = TargetColumn::from_slot_name(&slot) {
            projection.insert(provider_field_id, target);
        }
    }

    let existing = ctx
        .db
        .work_items_created_dates(integration_id, std::slice::from_ref(&external_id))
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;
    let existing = existing.get(&external_id);

    let created = fields
        .get("created")
        .and_then(Value::as_str)
        .and_then(parse_jira_datetime);
    let updated = fields
        .get("updated")
        .and_then(Value::as_str)
        .and_then(parse_jira_datetime);

    let now = Utc::now();
    let mut tx = ctx
        .db
        .pool()
        .begin()
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;

    let row = build_issue_columns(
        &fields, &key, &projects, &wits, &statuses, &projection, created, updated,
    );

    let work_item_id = match existing {
        Some(existing) => {
            let mut columns = row.columns.clone();
            let mut values = row.values.clone();
            columns.push("active");
            values.push(SqlValue::Bool(true));
            columns.push("last_updated_at");
            values.push(SqlValue::Timestamp(now));

            BulkOperations::bulk_update(
                &mut *tx,
                "work_items",
                &columns,
                vec![(existing.id, values)],
                ctx.config.batch_size,
            )
            .await
            .map_err(|e| PipelineError::storage(e.to_string()))?;
            existing.id
        }
        None => {
            let mut columns = vec!["tenant_id", "integration_id", "external_id"];
            let mut values = vec![
                SqlValue::I64(tenant_id),
                SqlValue::I64(integration_id),
                SqlValue::text(&external_id),
            ];
            columns.extend(row.columns.iter().copied());
            values.extend(row.values.iter().cloned());

            BulkOperations::bulk_insert(
                &mut *tx,
                "work_items",
                &columns,
                vec![values],
                ctx.config.batch_size,
            )
            .await
            .map_err(|e| PipelineError::storage(e.to_string()))?;

            *id_map_tx(&mut *tx, IdTable::WorkItems, integration_id)
                .await
                .map_err(|e| PipelineError::storage(e.to_string()))?
                .get(&external_id)
                .ok_or_else(|| {
                    PipelineError::transform(format!("work item {external_id} vanished mid-insert"))
                })?
        }
    };

    // Sprint associations via the mapped sprints field
    if let Some(sprints_field_id) = projection.sprints_field_id() {
        if let Some(value) = fields.get(sprints_field_id) {
            let fallback_added = created.or(updated).unwrap_or(now);
            for sprint in extract_sprints(value) {
                let sprint_id = upsert_sprint_tx(
                    &mut *tx,
                    tenant_id,
                    integration_id,
                    &sprint.external_id,
                    sprint.board_id,
                    sprint.name.as_deref(),
                    sprint.state.as_deref(),
                )
                .await
                .map_err(|e| PipelineError::storage(e.to_string()))?;

                // Deterministic added_date keeps re-runs from duplicating edges
                let added_date = sprint.start_date.unwrap_or(fallback_added);
                BulkOperations::bulk_insert_relationships(
                    &mut *tx,
                    "work_items_sprints",
                    &["work_item_id", "sprint_id", "added_date", "tenant_id", "active"],
                    &["work_item_id", "sprint_id", "added_date"],
                    vec![vec![
                        SqlValue::I64(work_item_id),
                        SqlValue::I64(sprint_id),
                        SqlValue::Timestamp(added_date),
                        SqlValue::I64(tenant_id),
                        SqlValue::Bool(true),
                    ]],
                    ctx.config.batch_size,
                )
                .await
                .map_err(|e| PipelineError::storage(e.to_string()))?;
            }
        }
    }

    // Changelog chain: dedup on (work_item_id, external_id), insert-only
    let histories = issue
        .get("changelog")
        .and_then(|c| c.get("histories"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let chain_base = created.or(existing.and_then(|e| e.created)).unwrap_or(now);
    let chain = build_changelog_chain(chain_base, &histories);

    let known_keys: HashSet<(i64, String)> = ctx
        .db
        .existing_changelog_keys(&[work_item_id])
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;

    let mut inserted: Vec<&NewChangelog> = Vec::new();
    let mut changelog_rows = Vec::new();
    for entry in &chain {
        if known_keys.contains(&(work_item_id, entry.external_id.clone())) {
            continue;
        }
        changelog_rows.push(vec![
            SqlValue::I64(tenant_id),
            SqlValue::I64(integration_id),
            SqlValue::I64(work_item_id),
            SqlValue::text(&entry.external_id),
            SqlValue::NullableI64(
                entry
                    .from_status_external_id
                    .as_deref()
                    .and_then(|ext| statuses.get(ext).copied()),
            ),
            SqlValue::NullableI64(
                entry
                    .to_status_external_id
                    .as_deref()
                    .and_then(|ext| statuses.get(ext).copied()),
            ),
            SqlValue::Timestamp(entry.transition_start_date),
            SqlValue::Timestamp(entry.transition_change_date),
            SqlValue::F64(entry.time_in_status_seconds),
            SqlValue::opt_text(entry.changed_by.clone()),
        ]);
        inserted.push(entry);
    }

    BulkOperations::bulk_insert(
        &mut *tx,
        "changelogs",
        &[
            "tenant_id",
            "integration_id",
            "work_item_id",
            "external_id",
            "from_status_id",
            "to_status_id",
            "transition_start_date",
            "transition_change_date",
            "time_in_status_seconds",
            "changed_by",
        ],
        changelog_rows,
        ctx.config.batch_size,
    )
    .await
    .map_err(|e| PipelineError::storage(e.to_string()))?;

    // Metric columns are a pure function of the full chain
    let mut transitions: Vec<TransitionRecord> = ctx
        .db
        .changelogs_for_work_item(work_item_id)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?
        .into_iter()
        .filter(|row| !inserted.iter().any(|e| e.external_id == row.external_id))
        .map(|row| TransitionRecord {
            to_status_id: row.to_status_id,
            transition_change_date: row.transition_change_date,
            time_in_status_seconds: row.time_in_status_seconds,
        })
        .collect();
    transitions.extend(inserted.iter().map(|entry| TransitionRecord {
        to_status_id: entry
            .to_status_external_id
            .as_deref()
            .and_then(|ext| statuses.get(ext).copied()),
        transition_change_date: Some(entry.transition_change_date),
        time_in_status_seconds: entry.time_in_status_seconds,
    }));

    let metrics = WorkflowMetrics::compute(&transitions, &categories);
    BulkOperations::bulk_update(
        &mut *tx,
        "work_items",
        &[
            "work_first_committed_at",
            "work_first_started_at",
            "work_last_started_at",
            "work_first_completed_at",
            "work_last_completed_at",
            "total_work_starts",
            "total_completions",
            "total_backlog_returns",
            "total_work_time_seconds",
            "total_review_time_seconds",
            "total_cycle_time_seconds",
            "total_lead_time_seconds",
            "workflow_complexity_score",
            "rework_indicator",
            "direct_completion",
            "last_updated_at",
        ],
        vec![(
            work_item_id,
            vec![
                SqlValue::NullableTimestamp(metrics.work_first_committed_at),
                SqlValue::NullableTimestamp(metrics.work_first_started_at),
                SqlValue::NullableTimestamp(metrics.work_last_started_at),
                SqlValue::NullableTimestamp(metrics.work_first_completed_at),
                SqlValue::NullableTimestamp(metrics.work_last_completed_at),
                SqlValue::I32(metrics.total_work_starts),
                SqlValue::I32(metrics.total_completions),
                SqlValue::I32(metrics.total_backlog_returns),
                SqlValue::F64(metrics.total_work_time_seconds),
                SqlValue::F64(metrics.total_review_time_seconds),
                SqlValue::F64(metrics.total_cycle_time_seconds),
                SqlValue::F64(metrics.total_lead_time_seconds),
                SqlValue::I32(metrics.workflow_complexity_score),
                SqlValue::Bool(metrics.rework_indicator),
                SqlValue::Bool(metrics.direct_completion),
                SqlValue::Timestamp(now),
            ],
        )],
        ctx.config.batch_size,
    )
    .await
    .map_err(|e| PipelineError::storage(e.to_string()))?;

    tx.commit()
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;

    // Commit first, then hand the work item to the embedding stage
    let mut embedding = envelope.clone();
    embedding.retry_count = 0;
    if !ctx.queues.publish_embedding_job(ctx.tier, &embedding).await {
        return Err(PipelineError::queue(format!(
            "embedding publish failed for work item {key}"
        )));
    }

    tracing::debug!(%key, changelogs = inserted.len(), "issue transformed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_changelog_chain_is_contiguous() {
        let histories = vec![
            json!({
                "id": "h2",
                "created": "2024-01-03T10:00:00Z",
                "items": [{"field": "status", "from": "3", "to": "5"}],
                "author": {"displayName": "B"}
            }),
            json!({
                "id": "h1",
                "created": "2024-01-02T10:00:00Z",
                "items": [{"field": "status", "from": "1", "to": "3"}],
                "author": {"displayName": "A"}
            }),
        ];
        let chain = build_changelog_chain(at(1), &histories);

        assert_eq!(chain.len(), 2);
        // Chain starts at the work item's creation instant
        assert_eq!(chain[0].transition_start_date, at(1));
        assert_eq!(chain[0].transition_change_date, at(2));
        assert_eq!(chain[0].time_in_status_seconds, 86400.0);
        // Each link starts where the previous ended
        assert_eq!(chain[1].transition_start_date, at(2));
        assert_eq!(chain[1].transition_change_date, at(3));
        assert_eq!(chain[1].time_in_status_seconds, 86400.0);
        assert_eq!(chain[0].changed_by.as_deref(), Some("A"));
        assert_eq!(chain[1].to_status_external_id.as_deref(), Some("5"));
    }

    #[test]
    fn test_changelog_chain_skips_non_status_items() {
        let histories = vec![
            json!({
                "id": "h1",
                "created": "2024-01-02T10:00:00Z",
                "items": [{"field": "assignee", "from": null, "to": "x"}]
            }),
            json!({
                "id": "h2",
                "created": "2024-01-04T10:00:00Z",
                "items": [{"field": "status", "from": "1", "to": "5"}]
            }),
        ];
        let chain = build_changelog_chain(at(1), &histories);

        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].external_id, "h2");
        assert_eq!(chain[0].transition_start_date, at(1));
        assert_eq!(chain[0].time_in_status_seconds, 3.0 * 86400.0);
    }

    #[test]
    fn test_extract_sprints_handles_numeric_ids() {
        let value = json!([
            {"id": 42, "boardId": 7, "name": "Sprint 1", "state": "active",
             "startDate": "2024-01-01T00:00:00Z"},
            {"id": "43", "name": "Sprint 2", "state": "future"},
            "not-a-sprint"
        ]);
        let sprints = extract_sprints(&value);

        assert_eq!(sprints.len(), 2);
        assert_eq!(sprints[0].external_id, "42");
        assert_eq!(sprints[0].board_id, Some(7));
        assert!(sprints[0].start_date.is_some());
        assert_eq!(sprints[1].external_id, "43");
        assert_eq!(sprints[1].state.as_deref(), Some("future"));
    }

    #[test]
    fn test_issue_columns_flatten_and_resolve() {
        let fields = json!({
            "summary": "Fix pipeline",
            "project": {"id": "10"},
            "issuetype": {"id": "3"},
            "status": {"id": "5"},
            "priority": {"name": "High"},
            "assignee": {"displayName": "Ada"},
            "labels": ["etl", "infra"],
            "parent": {"id": "99"},
            "customfield_10024": "5.5",
            "customfield_10000": "{}"
        });
        let projects = HashMap::from([("10".to_string(), 1i64)]);
        let wits = HashMap::from([("3".to_string(), 2i64)]);
        let statuses = HashMap::from([("5".to_string(), 3i64)]);

        let mut projection = FieldProjection::new();
        projection.insert("customfield_10024", TargetColumn::StoryPoints);
        projection.insert("customfield_10000", TargetColumn::Development);

        let row = build_issue_columns(
            &fields, "P-1", &projects, &wits, &statuses, &projection, None, None,
        );
        let get = |name: &str| {
            let idx = row.columns.iter().position(|c| *c == name).unwrap();
            row.values[idx].clone()
        };

        assert_eq!(get("project_id"), SqlValue::NullableI64(Some(1)));
        assert_eq!(get("wit_id"), SqlValue::NullableI64(Some(2)));
        assert_eq!(get("status_id"), SqlValue::NullableI64(Some(3)));
        assert_eq!(get("priority"), SqlValue::opt_text(Some("High".into())));
        assert_eq!(get("labels"), SqlValue::opt_text(Some("etl,infra".into())));
        assert_eq!(get("story_points"), SqlValue::NullableF64(Some(5.5)));
        // "{}" means no development activity
        assert_eq!(get("development"), SqlValue::Bool(false));
    }

    #[test]
    fn test_unresolved_fk_stays_null() {
        let fields = json!({"project": {"id": "404"}});
        let row = build_issue_columns(
            &fields,
            "P-2",
            &HashMap::new(),
            &HashMap::new(),
            &HashMap::new(),
            &FieldProjection::new(),
            None,
            None,
        );
        let idx = row.columns.iter().position(|c| *c == "project_id").unwrap();
        assert_eq!(row.values[idx], SqlValue::NullableI64(None));
    }
}
