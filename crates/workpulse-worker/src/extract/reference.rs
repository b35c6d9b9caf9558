// Reference-data extraction: projects with issue types, per-project statuses,
// and the user-initiated custom/special field catalogs.

use serde_json::json;

use workpulse_core::{BatchFlags, ExtractionType, Result, StageState};

use crate::extract::ExtractionContext;
use crate::status::Stage;
use workpulse_core::status_doc::steps;

#[derive(Debug, Default)]
pub struct ReferenceOutcome {
    pub projects_fetched: usize,
    pub status_pages: usize,
}

/// Fetch projects (expanded with issue types) and statuses per project.
/// One raw row for the project page, one raw row per project for statuses.
///
/// The projects message opens the step; the final statuses emission closes
/// it (`last_item`, plus `last_job_item` on the job's terminal step) unless
/// `catalogs_follow` is set, in which case the field-catalog sub-sequence
/// extends the step and owns its close.
pub async fn extract_projects_and_statuses(
    ctx: &ExtractionContext,
    target_projects: &[String],
    catalogs_follow: bool,
    terminal_step: bool,
) -> Result<ReferenceOutcome> {
    ctx.status
        .set_stage(
            ctx.tenant_id,
            ctx.job_id,
            steps::REFERENCE_DATA,
            Stage::Extraction,
            StageState::Running,
        )
        .await?;

    let projects = ctx
        .client
        .projects_with_issue_types(target_projects, ctx.config.reference_page_size)
        .await?;

    if projects.is_empty() {
        // Zero entities still complete the step downstream
        ctx.publish_marker(
            ExtractionType::ProjectsAndIssueTypes,
            BatchFlags {
                first_item: true,
                last_item: !catalogs_follow,
                last_job_item: !catalogs_follow && terminal_step,
            },
        )
        .await?;
        ctx.status
            .set_stage(
                ctx.tenant_id,
                ctx.job_id,
                steps::REFERENCE_DATA,
                Stage::Extraction,
                StageState::Finished,
            )
            .await?;
        return Ok(ReferenceOutcome::default());
    }

    let mut outcome = ReferenceOutcome {
        projects_fetched: projects.len(),
        status_pages: 0,
    };

    // One raw row for the whole project page; statuses follow per project
    ctx.persist_and_publish(
        ExtractionType::ProjectsAndIssueTypes,
        json!({ "projects": projects.clone() }),
        None,
        BatchFlags::first(),
    )
    .await?;

    for (index, project) in projects.iter().enumerate() {
        let is_last_project = index + 1 == projects.len();
        let project_id = project
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let project_key = project
            .get("key")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let closes_step = is_last_project && !catalogs_follow;

        if project_id.is_empty() {
            tracing::warn!(?project_key, "project without id skipped in status fetch");
            if closes_step {
                ctx.publish_marker(
                    ExtractionType::StatusesAndRelationships,
                    BatchFlags::last().with_job_end(terminal_step),
                )
                .await?;
            }
            continue;
        }

        let statuses = ctx.client.project_statuses(&project_id).await?;

        if statuses.is_empty() {
            // Empty responses are completion signals, not silent drops
            if closes_step {
                ctx.publish_marker(
                    ExtractionType::StatusesAndRelationships,
                    BatchFlags::last().with_job_end(terminal_step),
                )
                .await?;
            }
            continue;
        }

        let flags = BatchFlags {
            first_item: false,
            last_item: closes_step,
            last_job_item: closes_step && terminal_step,
        };
        ctx.persist_and_publish(
            ExtractionType::StatusesAndRelationships,
            json!({
                "project_id": project_id,
                "project_key": project_key,
                "issue_types": statuses,
            }),
            Some(project_id),
            flags,
        )
        .await?;
        outcome.status_pages += 1;
    }

    ctx.status
        .set_stage(
            ctx.tenant_id,
            ctx.job_id,
            steps::REFERENCE_DATA,
            Stage::Extraction,
            StageState::Finished,
        )
        .await?;

    Ok(outcome)
}

/// User-initiated catalog refresh: createmeta custom fields plus the
/// special-field discovery via field search.
///
/// The custom-fields message opens the step only in a standalone run
/// (`opens_step`); when the catalogs extend a projects/statuses run the step
/// is already open. The special-fields emission always closes the step and
/// carries `last_job_item` on the job's terminal step.
pub async fn extract_field_catalogs(
    ctx: &ExtractionContext,
    target_projects: &[String],
    opens_step: bool,
    terminal_step: bool,
) -> Result<()> {
    let createmeta = ctx.client.createmeta_fields(target_projects).await?;
    ctx.persist_and_publish(
        ExtractionType::CustomFields,
        createmeta,
        None,
        BatchFlags {
            first_item: opens_step,
            last_item: false,
            last_job_item: false,
        },
    )
    .await?;

    let special_fields = ctx
        .client
        .field_search(Some("development"), ctx.config.reference_page_size)
        .await?;

    let closing_flags = BatchFlags::last().with_job_end(terminal_step);
    if special_fields.is_empty() {
        ctx.publish_marker(ExtractionType::SpecialFields, closing_flags)
            .await?;
    } else {
        ctx.persist_and_publish(
            ExtractionType::SpecialFields,
            json!({ "fields": special_fields }),
            None,
            closing_flags,
        )
        .await?;
    }

    Ok(())
}
