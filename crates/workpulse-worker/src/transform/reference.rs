// Reference-data transformers: projects and issue types, statuses with
// project relationships, and the custom/special field catalogs.

use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use workpulse_core::{BatchFlags, ExtractionType, JobEnvelope, PipelineError, Result, StageState};
use workpulse_storage::{BulkOperations, RawExtractionDataRow, SqlValue};

use crate::status::Stage;
use crate::transform::util::{id_map_tx, IdTable};
use crate::transform::{step_for_type, TransformContext};
use workpulse_core::status_doc::steps;

/// Issue type as it appears inside an expanded project payload
#[derive(Debug, Clone, PartialEq)]
pub struct IssueTypeRecord {
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub hierarchy_level: Option<i32>,
}

/// Collect issue types across all projects, deduplicated globally by
/// external id. Accepts both `issueTypes` and `issuetypes` payload casings.
pub fn collect_issue_types(projects: &[Value]) -> (Vec<IssueTypeRecord>, Vec<(String, String)>) {
    let mut seen = HashSet::new();
    let mut issue_types = Vec::new();
    let mut edges = Vec::new();

    for project in projects {
        let Some(project_id) = project.get("id").and_then(Value::as_str) else {
            continue;
        };
        let entries = project
            .get("issueTypes")
            .or_else(|| project.get("issuetypes"))
            .and_then(Value::as_array);
        let Some(entries) = entries else { continue };

        for entry in entries {
            let Some(external_id) = entry.get("id").and_then(Value::as_str) else {
                continue;
            };
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            edges.push((project_id.to_string(), external_id.to_string()));
            if seen.insert(external_id.to_string()) {
                issue_types.push(IssueTypeRecord {
                    external_id: external_id.to_string(),
                    name,
                    description: entry
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    hierarchy_level: entry
                        .get("hierarchyLevel")
                        .and_then(Value::as_i64)
                        .map(|l| l as i32),
                });
            }
        }
    }
    (issue_types, edges)
}

/// Upsert projects and globally-deduplicated issue types, then the
/// project <-> issue-type edges.
pub async fn transform_projects_and_issue_types(
    ctx: &TransformContext,
    envelope: &JobEnvelope,
    raw: &RawExtractionDataRow,
) -> Result<()> {
    let projects: Vec<Value> = raw
        .raw_data
        .get("projects")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| PipelineError::bad_data("projects payload missing 'projects' array"))?;

    let tenant_id = envelope.tenant_id;
    let integration_id = envelope.integration_id;

    let existing_projects: HashMap<String, i64> = ctx
        .db
        .existing_projects(integration_id)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?
        .into_iter()
        .map(|p| (p.external_id, p.id))
        .collect();
    let existing_wits: HashMap<String, i64> = ctx
        .db
        .existing_wits(integration_id)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?
        .into_iter()
        .map(|w| (w.external_id, w.id))
        .collect();
    let wit_mapping = ctx
        .db
        .wit_mapping_by_name()
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;

    let (issue_types, edges) = collect_issue_types(&projects);
    let now = Utc::now();

    let mut tx = ctx
        .db
        .pool()
        .begin()
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;

    // Projects: partition into insert/update by external_id
    let mut project_inserts = Vec::new();
    let mut project_updates = Vec::new();
    for project in &projects {
        let Some(external_id) = project.get("id").and_then(Value::as_str) else {
            tracing::warn!("project without id skipped");
            continue;
        };
        let key = project
            .get("key")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let name = project.get("name").and_then(Value::as_str).map(str::to_string);
        let project_type = project
            .get("projectTypeKey")
            .and_then(Value::as_str)
            .map(str::to_string);

        match existing_projects.get(external_id) {
            Some(id) => project_updates.push((
                *id,
                vec![
                    SqlValue::text(key),
                    SqlValue::opt_text(name),
                    SqlValue::opt_text(project_type),
                    SqlValue::Bool(true),
                    SqlValue::Timestamp(now),
                ],
            )),
            None => project_inserts.push(vec![
                SqlValue::I64(tenant_id),
                SqlValue::I64(integration_id),
                SqlValue::text(external_id),
                SqlValue::text(key),
                SqlValue::opt_text(name),
                SqlValue::opt_text(project_type),
                SqlValue::Bool(true),
            ]),
        }
    }

    BulkOperations::bulk_insert(
        &mut *tx,
        "projects",
        &[
            "tenant_id",
            "integration_id",
            "external_id",
            "key",
            "name",
            "project_type",
            "active",
        ],
        project_inserts,
        ctx.config.batch_size,
    )
    .await
    .map_err(|e| PipelineError::storage(e.to_string()))?;

    BulkOperations::bulk_update(
        &mut *tx,
        "projects",
        &["key", "name", "project_type", "active", "last_updated_at"],
        project_updates,
        ctx.config.batch_size,
    )
    .await
    .map_err(|e| PipelineError::storage(e.to_string()))?;

    // Issue types: already deduplicated globally
    let mut wit_inserts = Vec::new();
    let mut wit_updates = Vec::new();
    for wit in &issue_types {
        let mapping_id = wit_mapping.get(&wit.name.to_lowercase()).copied();
        match existing_wits.get(&wit.external_id) {
            Some(id) => wit_updates.push((
                *id,
                vec![
                    SqlValue::text(&wit.name),
                    SqlValue::opt_text(wit.description.clone()),
                    match wit.hierarchy_level {
                        Some(level) => SqlValue::I32(level),
                        None => SqlValue::Null,
                    },
                    SqlValue::NullableI64(mapping_id),
                    SqlValue::Bool(true),
                    SqlValue::Timestamp(now),
                ],
            )),
            None => wit_inserts.push(vec![
                SqlValue::I64(tenant_id),
                SqlValue::I64(integration_id),
                SqlValue::text(&wit.external_id),
                SqlValue::text(&wit.name),
                SqlValue::opt_text(wit.description.clone()),
                match wit.hierarchy_level {
                    Some(level) => SqlValue::I32(level),
                    None => SqlValue::Null,
                },
                SqlValue::NullableI64(mapping_id),
                SqlValue::Bool(true),
            ]),
        }
    }

    BulkOperations::bulk_insert(
        &mut *tx,
        "wits",
        &[
            "tenant_id",
            "integration_id",
            "external_id",
            "original_name",
            "description",
            "hierarchy_level",
            "mapping_id",
            "active",
        ],
        wit_inserts,
        ctx.config.batch_size,
    )
    .await
    .map_err(|e| PipelineError::storage(e.to_string()))?;

    BulkOperations::bulk_update(
        &mut *tx,
        "wits",
        &[
            "original_name",
            "description",
            "hierarchy_level",
            "mapping_id",
            "active",
            "last_updated_at",
        ],
        wit_updates,
        ctx.config.batch_size,
    )
    .await
    .map_err(|e| PipelineError::storage(e.to_string()))?;

    // Edges need the ids of rows inserted in this transaction
    let project_ids = id_map_tx(&mut *tx, IdTable::Projects, integration_id)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;
    let wit_ids = id_map_tx(&mut *tx, IdTable::Wits, integration_id)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;

    let edge_rows: Vec<Vec<SqlValue>> = edges
        .iter()
        .filter_map(|(project_ext, wit_ext)| {
            let project_id = project_ids.get(project_ext)?;
            let wit_id = wit_ids.get(wit_ext)?;
            Some(vec![SqlValue::I64(*project_id), SqlValue::I64(*wit_id)])
        })
        .collect();

    BulkOperations::bulk_insert_relationships(
        &mut *tx,
        "projects_wits",
        &["project_id", "wit_id"],
        &["project_id", "wit_id"],
        edge_rows,
        ctx.config.batch_size,
    )
    .await
    .map_err(|e| PipelineError::storage(e.to_string()))?;

    tx.commit()
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;

    tracing::info!(
        projects = projects.len(),
        issue_types = issue_types.len(),
        "reference data transformed"
    );
    Ok(())
}

/// Distinct status extracted from a per-project statuses payload
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRecord {
    pub external_id: String,
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
}

/// Pull distinct statuses and (status_external_id) edge targets out of the
/// issue-type-grouped statuses payload.
pub fn collect_statuses(issue_types: &[Value]) -> (Vec<StatusRecord>, Vec<String>) {
    let mut seen = HashSet::new();
    let mut statuses = Vec::new();
    let mut edge_targets = Vec::new();

    for issue_type in issue_types {
        let Some(entries) = issue_type.get("statuses").and_then(Value::as_array) else {
            continue;
        };
        for entry in entries {
            let Some(external_id) = entry.get("id").and_then(Value::as_str) else {
                continue;
            };
            if seen.insert(external_id.to_string()) {
                statuses.push(StatusRecord {
                    external_id: external_id.to_string(),
                    name: entry
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    category: entry
                        .get("statusCategory")
                        .and_then(|c| c.get("name"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    description: entry
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                });
                edge_targets.push(external_id.to_string());
            }
        }
    }
    (statuses, edge_targets)
}

/// Upsert statuses for one project, wire project <-> status edges, and on
/// the last page fan the updated statuses out to the embedding queue.
pub async fn transform_statuses_and_relationships(
    ctx: &TransformContext,
    envelope: &JobEnvelope,
    raw: &RawExtractionDataRow,
) -> Result<()> {
    let project_external_id = raw
        .raw_data
        .get("project_id")
        .and_then(Value::as_str)
        .ok_or_else(|| PipelineError::bad_data("statuses payload missing project_id"))?
        .to_string();
    let issue_types: Vec<Value> = raw
        .raw_data
        .get("issue_types")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let tenant_id = envelope.tenant_id;
    let integration_id = envelope.integration_id;
    let (statuses, edge_targets) = collect_statuses(&issue_types);

    let existing_statuses: HashMap<String, i64> = ctx
        .db
        .existing_statuses(integration_id)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?
        .into_iter()
        .map(|s| (s.external_id, s.id))
        .collect();
    let status_mapping = ctx
        .db
        .status_mapping_by_name()
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;

    let now = Utc::now();
    let mut tx = ctx
        .db
        .pool()
        .begin()
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;

    let mut inserts = Vec::new();
    let mut updates = Vec::new();
    for status in &statuses {
        let mapping_id = status_mapping.get(&status.name.to_lowercase()).copied();
        match existing_statuses.get(&status.external_id) {
            Some(id) => updates.push((
                *id,
                vec![
                    SqlValue::text(&status.name),
                    SqlValue::opt_text(status.category.clone()),
                    SqlValue::opt_text(status.description.clone()),
                    SqlValue::NullableI64(mapping_id),
                    SqlValue::Bool(true),
                    SqlValue::Timestamp(now),
                ],
            )),
            None => inserts.push(vec![
                SqlValue::I64(tenant_id),
                SqlValue::I64(integration_id),
                SqlValue::text(&status.external_id),
                SqlValue::text(&status.name),
                SqlValue::opt_text(status.category.clone()),
                SqlValue::opt_text(status.description.clone()),
                SqlValue::NullableI64(mapping_id),
                SqlValue::Bool(true),
            ]),
        }
    }

    BulkOperations::bulk_insert(
        &mut *tx,
        "statuses",
        &[
            "tenant_id",
            "integration_id",
            "external_id",
            "original_name",
            "category",
            "description",
            "mapping_id",
            "active",
        ],
        inserts,
        ctx.config.batch_size,
    )
    .await
    .map_err(|e| PipelineError::storage(e.to_string()))?;

    BulkOperations::bulk_update(
        &mut *tx,
        "statuses",
        &[
            "original_name",
            "category",
            "description",
            "mapping_id",
            "active",
            "last_updated_at",
        ],
        updates,
        ctx.config.batch_size,
    )
    .await
    .map_err(|e| PipelineError::storage(e.to_string()))?;

    let project_ids = id_map_tx(&mut *tx, IdTable::Projects, integration_id)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;
    let status_ids = id_map_tx(&mut *tx, IdTable::Statuses, integration_id)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;

    match project_ids.get(&project_external_id) {
        Some(project_id) => {
            let edge_rows: Vec<Vec<SqlValue>> = edge_targets
                .iter()
                .filter_map(|status_ext| {
                    let status_id = status_ids.get(status_ext)?;
                    Some(vec![SqlValue::I64(*project_id), SqlValue::I64(*status_id)])
                })
                .collect();

            BulkOperations::bulk_insert_relationships(
                &mut *tx,
                "projects_statuses",
                &["project_id", "status_id"],
                &["project_id", "status_id"],
                edge_rows,
                ctx.config.batch_size,
            )
            .await
            .map_err(|e| PipelineError::storage(e.to_string()))?;
        }
        None => {
            // Unresolved FK: keep the statuses, drop the edges, keep going
            tracing::warn!(%project_external_id, "project not resolved, status edges skipped");
        }
    }

    tx.commit()
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;

    if envelope.last_item {
        fan_out_statuses_to_embedding(ctx, envelope).await?;
    }
    Ok(())
}

/// On the final statuses page, emit one embedding message per status touched
/// inside the sync window. With nothing updated the step finishes directly.
async fn fan_out_statuses_to_embedding(
    ctx: &TransformContext,
    envelope: &JobEnvelope,
) -> Result<()> {
    let since = envelope
        .new_last_sync_date
        .unwrap_or_else(|| Utc::now() - chrono::Duration::days(1));
    let updated = ctx
        .db
        .statuses_updated_since(envelope.integration_id, since)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;

    if updated.is_empty() {
        let step = steps::REFERENCE_DATA;
        ctx.status
            .set_stage(
                envelope.tenant_id,
                envelope.job_id,
                step,
                Stage::Embedding,
                StageState::Finished,
            )
            .await?;
        return Ok(());
    }

    let total = updated.len();
    for (index, status) in updated.iter().enumerate() {
        let flags = BatchFlags::for_position(index, total)
            .with_job_end(envelope.last_job_item && index + 1 == total);

        let mut embedding = envelope.forward_marker();
        // Status references always travel under the statuses type, even when
        // a field-catalog message closed the step
        embedding.message_type = ExtractionType::StatusesAndRelationships.as_str().to_string();
        embedding.external_id = Some(status.external_id.clone());
        embedding.first_item = flags.first_item;
        embedding.last_item = flags.last_item;
        embedding.last_job_item = flags.last_job_item;

        if !ctx.queues.publish_embedding_job(ctx.tier, &embedding).await {
            return Err(PipelineError::queue(format!(
                "embedding publish failed for status {}",
                status.external_id
            )));
        }
    }
    Ok(())
}

/// Custom-field definition pulled from either field catalog payload
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRecord {
    pub external_id: String,
    pub name: String,
    pub field_type: Option<String>,
    pub operations: Option<String>,
}

/// Fields out of a createmeta response: projects[].issuetypes[].fields is a
/// map of field id to metadata. Both issue-type key casings appear in the
/// wild; only provider custom fields are kept.
pub fn collect_createmeta_fields(payload: &Value) -> Vec<FieldRecord> {
    let mut seen = HashSet::new();
    let mut fields = Vec::new();

    let projects = payload
        .get("projects")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for project in &projects {
        let issue_types = project
            .get("issuetypes")
            .or_else(|| project.get("issueTypes"))
            .and_then(Value::as_array);
        let Some(issue_types) = issue_types else { continue };

        for issue_type in issue_types {
            let Some(field_map) = issue_type.get("fields").and_then(Value::as_object) else {
                continue;
            };
            for (field_id, meta) in field_map {
                if !field_id.starts_with("customfield_") || !seen.insert(field_id.clone()) {
                    continue;
                }
                fields.push(FieldRecord {
                    external_id: field_id.clone(),
                    name: meta
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    field_type: meta
                        .get("schema")
                        .and_then(|s| s.get("type"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    operations: meta
                        .get("operations")
                        .and_then(Value::as_array)
                        .map(|ops| {
                            ops.iter()
                                .filter_map(Value::as_str)
                                .collect::<Vec<_>>()
                                .join(",")
                        }),
                });
            }
        }
    }
    fields
}

/// Fields out of a field-search response
pub fn collect_search_fields(payload: &Value) -> Vec<FieldRecord> {
    payload
        .get("fields")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
        .iter()
        .filter_map(|field| {
            let external_id = field.get("id").and_then(Value::as_str)?;
            Some(FieldRecord {
                external_id: external_id.to_string(),
                name: field
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                field_type: field
                    .get("schema")
                    .and_then(|s| s.get("type"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                operations: None,
            })
        })
        .collect()
}

/// Special-field slot a field name auto-maps to
pub fn special_slot_for_name(name: &str) -> Option<&'static str> {
    match name.trim().to_lowercase().as_str() {
        "development" => Some("development_field_id"),
        "sprint" | "sprints" => Some("sprints_field_id"),
        "story points" | "story point estimate" => Some("story_points_field_id"),
        "team" => Some("team_field_id"),
        _ => None,
    }
}

pub async fn transform_custom_fields(
    ctx: &TransformContext,
    envelope: &JobEnvelope,
    raw: &RawExtractionDataRow,
) -> Result<()> {
    let fields = collect_createmeta_fields(&raw.raw_data);
    upsert_field_catalog(ctx, envelope, fields).await
}

pub async fn transform_special_fields(
    ctx: &TransformContext,
    envelope: &JobEnvelope,
    raw: &RawExtractionDataRow,
) -> Result<()> {
    let fields = collect_search_fields(&raw.raw_data);
    upsert_field_catalog(ctx, envelope, fields).await
}

async fn upsert_field_catalog(
    ctx: &TransformContext,
    envelope: &JobEnvelope,
    fields: Vec<FieldRecord>,
) -> Result<()> {
    if fields.is_empty() {
        // Nothing to upsert, but a step-closing message still fans the
        // updated statuses out to embedding
        if envelope.last_item {
            fan_out_statuses_to_embedding(ctx, envelope).await?;
        }
        return Ok(());
    }
    let tenant_id = envelope.tenant_id;
    let integration_id = envelope.integration_id;

    let existing: HashMap<String, i64> = ctx
        .db
        .existing_custom_fields(integration_id)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?
        .into_iter()
        .map(|f| (f.external_id, f.id))
        .collect();

    let now = Utc::now();
    let mut tx = ctx
        .db
        .pool()
        .begin()
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;

    let mut inserts = Vec::new();
    let mut updates = Vec::new();
    for field in &fields {
        match existing.get(&field.external_id) {
            Some(id) => updates.push((
                *id,
                vec![
                    SqlValue::text(&field.name),
                    SqlValue::opt_text(field.field_type.clone()),
                    SqlValue::opt_text(field.operations.clone()),
                    SqlValue::Bool(true),
                    SqlValue::Timestamp(now),
                ],
            )),
            None => inserts.push(vec![
                SqlValue::I64(tenant_id),
                SqlValue::I64(integration_id),
                SqlValue::text(&field.external_id),
                SqlValue::text(&field.name),
                SqlValue::opt_text(field.field_type.clone()),
                SqlValue::opt_text(field.operations.clone()),
                SqlValue::Bool(true),
            ]),
        }
    }

    BulkOperations::bulk_insert(
        &mut *tx,
        "custom_fields",
        &[
            "tenant_id",
            "integration_id",
            "external_id",
            "name",
            "field_type",
            "operations",
            "active",
        ],
        inserts,
        ctx.config.batch_size,
    )
    .await
    .map_err(|e| PipelineError::storage(e.to_string()))?;

    BulkOperations::bulk_update(
        &mut *tx,
        "custom_fields",
        &["name", "field_type", "operations", "active", "last_updated_at"],
        updates,
        ctx.config.batch_size,
    )
    .await
    .map_err(|e| PipelineError::storage(e.to_string()))?;

    tx.commit()
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;

    // Auto-map the special slots for fields that just appeared
    let catalog = ctx
        .db
        .existing_custom_fields(integration_id)
        .await
        .map_err(|e| PipelineError::storage(e.to_string()))?;
    for field in &catalog {
        if let Some(slot) = special_slot_for_name(&field.name) {
            ctx.db
                .auto_map_special_field(tenant_id, integration_id, slot, field.id)
                .await
                .map_err(|e| PipelineError::storage(e.to_string()))?;
        }
    }

    tracing::info!(
        step = step_for_type(ExtractionType::CustomFields),
        fields = fields.len(),
        "field catalog transformed"
    );

    // When the catalogs close the reference step, the embedding fan-out for
    // statuses updated in this window happens here instead of on the
    // statuses page
    if envelope.last_item {
        fan_out_statuses_to_embedding(ctx, envelope).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_issue_type_shared_across_projects_dedupes() {
        let projects = vec![
            json!({"id": "10", "key": "P1", "issueTypes": [{"id": "10001", "name": "Story"}]}),
            json!({"id": "11", "key": "P2", "issuetypes": [{"id": "10001", "name": "Story"}]}),
        ];
        let (issue_types, edges) = collect_issue_types(&projects);

        assert_eq!(issue_types.len(), 1);
        assert_eq!(issue_types[0].external_id, "10001");
        // Both projects still get an edge to the shared type
        assert_eq!(edges.len(), 2);
        assert!(edges.contains(&("10".to_string(), "10001".to_string())));
        assert!(edges.contains(&("11".to_string(), "10001".to_string())));
    }

    #[test]
    fn test_collect_statuses_distinct_with_category() {
        let issue_types = vec![
            json!({"statuses": [
                {"id": "1", "name": "Backlog", "statusCategory": {"name": "To Do"}},
                {"id": "3", "name": "Doing", "statusCategory": {"name": "In Progress"}}
            ]}),
            json!({"statuses": [
                {"id": "3", "name": "Doing", "statusCategory": {"name": "In Progress"}}
            ]}),
        ];
        let (statuses, edges) = collect_statuses(&issue_types);

        assert_eq!(statuses.len(), 2);
        assert_eq!(edges, vec!["1".to_string(), "3".to_string()]);
        assert_eq!(statuses[0].category.as_deref(), Some("To Do"));
    }

    #[test]
    fn test_createmeta_field_collection() {
        let payload = json!({"projects": [
            {"issuetypes": [{"fields": {
                "summary": {"name": "Summary"},
                "customfield_10024": {
                    "name": "Story Points",
                    "schema": {"type": "number"},
                    "operations": ["set"]
                }
            }}]},
            {"issueTypes": [{"fields": {
                "customfield_10024": {"name": "Story Points"}
            }}]}
        ]});
        let fields = collect_createmeta_fields(&payload);

        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].external_id, "customfield_10024");
        assert_eq!(fields[0].field_type.as_deref(), Some("number"));
        assert_eq!(fields[0].operations.as_deref(), Some("set"));
    }

    #[test]
    fn test_special_slot_names() {
        assert_eq!(special_slot_for_name("Development"), Some("development_field_id"));
        assert_eq!(special_slot_for_name("Sprint"), Some("sprints_field_id"));
        assert_eq!(special_slot_for_name("Story Points"), Some("story_points_field_id"));
        assert_eq!(special_slot_for_name("Team"), Some("team_field_id"));
        assert_eq!(special_slot_for_name("Epic Link"), None);
    }
}
