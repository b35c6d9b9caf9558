// Repository layer for database operations

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};

use crate::models::*;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create database connection from URL
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run embedded migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;
        Ok(())
    }

    // ============================================
    // Tenants & integrations
    // ============================================

    pub async fn get_tenant(&self, id: i64) -> Result<Option<TenantRow>> {
        let row = sqlx::query_as::<_, TenantRow>(
            r#"
            SELECT id, name, tier, active, created_at, last_updated_at
            FROM tenants
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_integration(&self, id: i64) -> Result<Option<IntegrationRow>> {
        let row = sqlx::query_as::<_, IntegrationRow>(
            r#"
            SELECT id, tenant_id, provider, credentials, base_url, base_search_filter,
                   active, created_at, last_updated_at
            FROM integrations
            WHERE id = $1 AND active = TRUE
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    // ============================================
    // Job schedules
    // ============================================

    pub async fn get_job_schedule(&self, id: i64) -> Result<Option<JobScheduleRow>> {
        let row = sqlx::query_as::<_, JobScheduleRow>(
            r#"
            SELECT id, tenant_id, integration_id, job_name, status, last_success_at,
                   last_run_started_at, next_run, execution_order, error_message,
                   checkpoint, status_doc, created_at, last_updated_at
            FROM job_schedules
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Schedule lookup by integration, with a fallback by tenant + job-name
    /// prefix for legacy rows that predate the integration binding.
    pub async fn find_schedule_for_integration(
        &self,
        integration_id: i64,
        tenant_id: i64,
        job_name_prefix: &str,
    ) -> Result<Option<JobScheduleRow>> {
        let row = sqlx::query_as::<_, JobScheduleRow>(
            r#"
            SELECT id, tenant_id, integration_id, job_name, status, last_success_at,
                   last_run_started_at, next_run, execution_order, error_message,
                   checkpoint, status_doc, created_at, last_updated_at
            FROM job_schedules
            WHERE integration_id = $1
            ORDER BY execution_order ASC
            LIMIT 1
            "#,
        )
        .bind(integration_id)
        .fetch_optional(&self.pool)
        .await?;

        if row.is_some() {
            return Ok(row);
        }

        let fallback = sqlx::query_as::<_, JobScheduleRow>(
            r#"
            SELECT id, tenant_id, integration_id, job_name, status, last_success_at,
                   last_run_started_at, next_run, execution_order, error_message,
                   checkpoint, status_doc, created_at, last_updated_at
            FROM job_schedules
            WHERE tenant_id = $1 AND job_name LIKE $2
            ORDER BY execution_order ASC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(format!("{}%", job_name_prefix))
        .fetch_optional(&self.pool)
        .await?;

        Ok(fallback)
    }

    pub async fn mark_job_running(&self, id: i64, started_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_schedules
            SET status = $2, last_run_started_at = $3, error_message = NULL,
                last_updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(job_status::RUNNING)
        .bind(started_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Terminal success: record the sync boundary and wake the next job in
    /// the execution_order cycle, skipping PAUSED entries.
    pub async fn mark_job_finished(&self, id: i64, last_success_at: DateTime<Utc>) -> Result<()> {
        let schedule = self
            .get_job_schedule(id)
            .await?
            .context("job schedule disappeared")?;

        sqlx::query(
            r#"
            UPDATE job_schedules
            SET status = $2, last_success_at = $3, error_message = NULL,
                last_updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(job_status::FINISHED)
        .bind(last_success_at)
        .execute(&self.pool)
        .await?;

        self.advance_job_cycle(&schedule).await
    }

    async fn advance_job_cycle(&self, finished: &JobScheduleRow) -> Result<()> {
        // Next slot after the finished one, wrapping to the start of the cycle
        let next: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM job_schedules
            WHERE tenant_id = $1 AND integration_id = $2
              AND execution_order > $3 AND status <> $4 AND id <> $5
            ORDER BY execution_order ASC
            LIMIT 1
            "#,
        )
        .bind(finished.tenant_id)
        .bind(finished.integration_id)
        .bind(finished.execution_order)
        .bind(job_status::PAUSED)
        .bind(finished.id)
        .fetch_optional(&self.pool)
        .await?;

        let next = match next {
            Some(row) => Some(row),
            None => {
                sqlx::query_as(
                    r#"
                    SELECT id FROM job_schedules
                    WHERE tenant_id = $1 AND integration_id = $2
                      AND status <> $3 AND id <> $4
                    ORDER BY execution_order ASC
                    LIMIT 1
                    "#,
                )
                .bind(finished.tenant_id)
                .bind(finished.integration_id)
                .bind(job_status::PAUSED)
                .bind(finished.id)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        if let Some((next_id,)) = next {
            sqlx::query(
                "UPDATE job_schedules SET status = $2, last_updated_at = NOW() WHERE id = $1",
            )
            .bind(next_id)
            .bind(job_status::PENDING)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Terminal failure; the error message is truncated to 500 chars
    pub async fn mark_job_failed(&self, id: i64, error: &str) -> Result<()> {
        let truncated: String = error.chars().take(500).collect();
        sqlx::query(
            r#"
            UPDATE job_schedules
            SET status = $2, error_message = $3, last_updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(job_status::FAILED)
        .bind(truncated)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Rate-limit park: no retry, no dead letter, resume at next_run
    pub async fn mark_job_rate_limited(
        &self,
        id: i64,
        next_run: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_schedules
            SET status = $2, next_run = $3, last_updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(job_status::RATE_LIMIT_REACHED)
        .bind(next_run)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_job_status_doc(
        &self,
        id: i64,
        status_doc: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE job_schedules SET status_doc = $2, last_updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status_doc)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_job_checkpoint(
        &self,
        id: i64,
        checkpoint: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE job_schedules SET checkpoint = $2, last_updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(checkpoint)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ============================================
    // Raw extraction staging
    // ============================================

    pub async fn insert_raw_extraction(&self, input: CreateRawExtraction) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO raw_extraction_data (tenant_id, integration_id, type, raw_data, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(input.tenant_id)
        .bind(input.integration_id)
        .bind(&input.extraction_type)
        .bind(&input.raw_data)
        .bind(raw_status::PENDING)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn get_raw_extraction(&self, id: i64) -> Result<Option<RawExtractionDataRow>> {
        let row = sqlx::query_as::<_, RawExtractionDataRow>(
            r#"
            SELECT id, tenant_id, integration_id, type, raw_data, status, error_details,
                   created_at, last_updated_at
            FROM raw_extraction_data
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// pending -> completed; write-once, other states are left alone
    pub async fn mark_raw_completed(&self, id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE raw_extraction_data
            SET status = $2, last_updated_at = NOW()
            WHERE id = $1 AND status = $3
            "#,
        )
        .bind(id)
        .bind(raw_status::COMPLETED)
        .bind(raw_status::PENDING)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// pending -> failed with error payload
    pub async fn mark_raw_failed(&self, id: i64, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE raw_extraction_data
            SET status = $2, error_details = $3, last_updated_at = NOW()
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(id)
        .bind(raw_status::FAILED)
        .bind(error)
        .bind(raw_status::PENDING)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ============================================
    // Reference lookups (external_id -> internal id)
    // ============================================

    pub async fn project_id_map(&self, integration_id: i64) -> Result<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT external_id, id FROM projects
            WHERE integration_id = $1 AND active = TRUE
            "#,
        )
        .bind(integration_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    pub async fn wit_id_map(&self, integration_id: i64) -> Result<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT external_id, id FROM wits
            WHERE integration_id = $1 AND active = TRUE
            "#,
        )
        .bind(integration_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    pub async fn status_id_map(&self, integration_id: i64) -> Result<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT external_id, id FROM statuses
            WHERE integration_id = $1 AND active = TRUE
            "#,
        )
        .bind(integration_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    /// status_id -> provider category string (lowercased downstream)
    pub async fn status_category_map(&self, integration_id: i64) -> Result<HashMap<i64, String>> {
        let rows: Vec<(i64, Option<String>)> = sqlx::query_as(
            r#"
            SELECT id, category FROM statuses
            WHERE integration_id = $1 AND active = TRUE
            "#,
        )
        .bind(integration_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, category)| category.map(|c| (id, c)))
            .collect())
    }

    /// Case-insensitive canonical-name lookup: lowercase name -> mapping id
    pub async fn wit_mapping_by_name(&self) -> Result<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT name, id FROM wits_mapping")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(n, id)| (n.to_lowercase(), id)).collect())
    }

    pub async fn status_mapping_by_name(&self) -> Result<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT name, id FROM statuses_mapping")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(n, id)| (n.to_lowercase(), id)).collect())
    }

    pub async fn existing_projects(&self, integration_id: i64) -> Result<Vec<ProjectRow>> {
        let rows = sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT id, tenant_id, integration_id, external_id, key, name, project_type, active
            FROM projects
            WHERE integration_id = $1
            "#,
        )
        .bind(integration_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn existing_wits(&self, integration_id: i64) -> Result<Vec<WitRow>> {
        let rows = sqlx::query_as::<_, WitRow>(
            r#"
            SELECT id, tenant_id, integration_id, external_id, original_name, description,
                   hierarchy_level, mapping_id, active
            FROM wits
            WHERE integration_id = $1
            "#,
        )
        .bind(integration_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn existing_statuses(&self, integration_id: i64) -> Result<Vec<StatusRow>> {
        let rows = sqlx::query_as::<_, StatusRow>(
            r#"
            SELECT id, tenant_id, integration_id, external_id, original_name, category,
                   description, mapping_id, active
            FROM statuses
            WHERE integration_id = $1
            "#,
        )
        .bind(integration_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Statuses touched since the given sync boundary, for embedding fan-out
    pub async fn statuses_updated_since(
        &self,
        integration_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<StatusRow>> {
        let rows = sqlx::query_as::<_, StatusRow>(
            r#"
            SELECT id, tenant_id, integration_id, external_id, original_name, category,
                   description, mapping_id, active
            FROM statuses
            WHERE integration_id = $1 AND active = TRUE AND last_updated_at >= $2
            ORDER BY id ASC
            "#,
        )
        .bind(integration_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ============================================
    // Custom fields & mapping
    // ============================================

    pub async fn existing_custom_fields(&self, integration_id: i64) -> Result<Vec<CustomFieldRow>> {
        let rows = sqlx::query_as::<_, CustomFieldRow>(
            r#"
            SELECT id, tenant_id, integration_id, external_id, name, field_type, operations, active
            FROM custom_fields
            WHERE integration_id = $1
            "#,
        )
        .bind(integration_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Mapped slots as (slot_name, provider_field_external_id) pairs, joined
    /// through the custom_fields catalog.
    pub async fn field_projection_pairs(
        &self,
        integration_id: i64,
    ) -> Result<Vec<(String, String)>> {
        let row: Option<(serde_json::Value,)> = sqlx::query_as(
            r#"
            SELECT jsonb_strip_nulls(jsonb_build_object(
                'team', tf.external_id,
                'sprints', sf.external_id,
                'development', df.external_id,
                'story_points', pf.external_id,
                'custom_field_01', c01.external_id, 'custom_field_02', c02.external_id,
                'custom_field_03', c03.external_id, 'custom_field_04', c04.external_id,
                'custom_field_05', c05.external_id, 'custom_field_06', c06.external_id,
                'custom_field_07', c07.external_id, 'custom_field_08', c08.external_id,
                'custom_field_09', c09.external_id, 'custom_field_10', c10.external_id,
                'custom_field_11', c11.external_id, 'custom_field_12', c12.external_id,
                'custom_field_13', c13.external_id, 'custom_field_14', c14.external_id,
                'custom_field_15', c15.external_id, 'custom_field_16', c16.external_id,
                'custom_field_17', c17.external_id, 'custom_field_18', c18.external_id,
                'custom_field_19', c19.external_id, 'custom_field_20', c20.external_id
            ))
            FROM custom_fields_mapping m
            LEFT JOIN custom_fields tf ON tf.id = m.team_field_id
            LEFT JOIN custom_fields sf ON sf.id = m.sprints_field_id
            LEFT JOIN custom_fields df ON df.id = m.development_field_id
            LEFT JOIN custom_fields pf ON pf.id = m.story_points_field_id
            LEFT JOIN custom_fields c01 ON c01.id = m.custom_field_01_id
            LEFT JOIN custom_fields c02 ON c02.id = m.custom_field_02_id
            LEFT JOIN custom_fields c03 ON c03.id = m.custom_field_03_id
            LEFT JOIN custom_fields c04 ON c04.id = m.custom_field_04_id
            LEFT JOIN custom_fields c05 ON c05.id = m.custom_field_05_id
            LEFT JOIN custom_fields c06 ON c06.id = m.custom_field_06_id
            LEFT JOIN custom_fields c07 ON c07.id = m.custom_field_07_id
            LEFT JOIN custom_fields c08 ON c08.id = m.custom_field_08_id
            LEFT JOIN custom_fields c09 ON c09.id = m.custom_field_09_id
            LEFT JOIN custom_fields c10 ON c10.id = m.custom_field_10_id
            LEFT JOIN custom_fields c11 ON c11.id = m.custom_field_11_id
            LEFT JOIN custom_fields c12 ON c12.id = m.custom_field_12_id
            LEFT JOIN custom_fields c13 ON c13.id = m.custom_field_13_id
            LEFT JOIN custom_fields c14 ON c14.id = m.custom_field_14_id
            LEFT JOIN custom_fields c15 ON c15.id = m.custom_field_15_id
            LEFT JOIN custom_fields c16 ON c16.id = m.custom_field_16_id
            LEFT JOIN custom_fields c17 ON c17.id = m.custom_field_17_id
            LEFT JOIN custom_fields c18 ON c18.id = m.custom_field_18_id
            LEFT JOIN custom_fields c19 ON c19.id = m.custom_field_19_id
            LEFT JOIN custom_fields c20 ON c20.id = m.custom_field_20_id
            WHERE m.integration_id = $1
            "#,
        )
        .bind(integration_id)
        .fetch_optional(&self.pool)
        .await?;

        let mut pairs = Vec::new();
        if let Some((value,)) = row {
            if let Some(map) = value.as_object() {
                for (slot, external_id) in map {
                    if let Some(external_id) = external_id.as_str() {
                        pairs.push((slot.clone(), external_id.to_string()));
                    }
                }
            }
        }
        Ok(pairs)
    }

    /// Point a special-field slot at a discovered custom field, creating the
    /// mapping row on first sight. Only fills empty slots.
    pub async fn auto_map_special_field(
        &self,
        tenant_id: i64,
        integration_id: i64,
        slot_column: &str,
        custom_field_id: i64,
    ) -> Result<()> {
        // Slot names come from a fixed internal list, never from input
        let allowed = [
            "team_field_id",
            "sprints_field_id",
            "development_field_id",
            "story_points_field_id",
        ];
        if !allowed.contains(&slot_column) {
            anyhow::bail!("Unsupported special-field slot: {}", slot_column);
        }

        sqlx::query(
            r#"
            INSERT INTO custom_fields_mapping (tenant_id, integration_id)
            VALUES ($1, $2)
            ON CONFLICT (integration_id) DO NOTHING
            "#,
        )
        .bind(tenant_id)
        .bind(integration_id)
        .execute(&self.pool)
        .await?;

        let sql = format!(
            "UPDATE custom_fields_mapping SET {slot} = $2, last_updated_at = NOW() \
             WHERE integration_id = $1 AND {slot} IS NULL",
            slot = slot_column
        );
        sqlx::query(&sql)
            .bind(integration_id)
            .bind(custom_field_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ============================================
    // Work items and satellites
    // ============================================

    pub async fn work_item_ids_by_external(
        &self,
        integration_id: i64,
        external_ids: &[String],
    ) -> Result<HashMap<String, i64>> {
        if external_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<WorkItemIdRow> = sqlx::query_as(
            r#"
            SELECT id, external_id FROM work_items
            WHERE integration_id = $1 AND external_id = ANY($2)
            "#,
        )
        .bind(integration_id)
        .bind(external_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| (r.external_id, r.id)).collect())
    }

    pub async fn work_items_created_dates(
        &self,
        integration_id: i64,
        external_ids: &[String],
    ) -> Result<HashMap<String, WorkItemCreatedRow>> {
        if external_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<WorkItemCreatedRow> = sqlx::query_as(
            r#"
            SELECT id, external_id, created FROM work_items
            WHERE integration_id = $1 AND external_id = ANY($2)
            "#,
        )
        .bind(integration_id)
        .bind(external_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| (r.external_id.clone(), r))
            .collect())
    }

    /// Existing (work_item_id, external_id) changelog keys, for insert dedup
    pub async fn existing_changelog_keys(
        &self,
        work_item_ids: &[i64],
    ) -> Result<HashSet<(i64, String)>> {
        if work_item_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT work_item_id, external_id FROM changelogs
            WHERE work_item_id = ANY($1)
            "#,
        )
        .bind(work_item_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    /// Full transition chain for one work item, oldest first
    pub async fn changelogs_for_work_item(&self, work_item_id: i64) -> Result<Vec<ChangelogRow>> {
        let rows = sqlx::query_as::<_, ChangelogRow>(
            r#"
            SELECT id, work_item_id, external_id, from_status_id, to_status_id,
                   transition_start_date, transition_change_date, time_in_status_seconds,
                   changed_by
            FROM changelogs
            WHERE work_item_id = $1 AND active = TRUE
            ORDER BY transition_change_date ASC
            "#,
        )
        .bind(work_item_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ============================================
    // Sprints
    // ============================================

    /// UPSERT keyed by (tenant, integration, external_id); concurrent issue
    /// workers frequently race on the same sprint.
    pub async fn upsert_sprint(&self, input: UpsertSprint) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO sprints (tenant_id, integration_id, external_id, board_id, name, state)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant_id, integration_id, external_id)
            DO UPDATE SET
                board_id = EXCLUDED.board_id,
                name = EXCLUDED.name,
                state = EXCLUDED.state,
                last_updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(input.tenant_id)
        .bind(input.integration_id)
        .bind(&input.external_id)
        .bind(input.board_id)
        .bind(&input.name)
        .bind(&input.state)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    // ============================================
    // PR links
    // ============================================

    pub async fn existing_pr_link_keys(
        &self,
        work_item_ids: &[i64],
    ) -> Result<HashSet<(i64, String, i32)>> {
        if work_item_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let rows: Vec<PrLinkKeyRow> = sqlx::query_as(
            r#"
            SELECT work_item_id, external_repo_id, pull_request_number
            FROM work_items_prs_links
            WHERE work_item_id = ANY($1)
            "#,
        )
        .bind(work_item_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| (r.work_item_id, r.external_repo_id, r.pull_request_number))
            .collect())
    }

    // ============================================
    // Dead letters
    // ============================================

    pub async fn insert_extraction_failure(&self, input: CreateExtractionFailure) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO extraction_failures
                (tenant_id, integration_id, extraction_type, original_message, error_message)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(input.tenant_id)
        .bind(input.integration_id)
        .bind(&input.extraction_type)
        .bind(&input.original_message)
        .bind(&input.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
