//! Candidate replacement for a module whose deadline lapsed.
//!
//! The switch runs in one transaction guarded by a single-attempt CAS on the
//! outgoing engagement's version: of two concurrent reassignments of the same
//! module, exactly one commits and the other receives a conflict error — never
//! a silent overwrite. Only the target module's task states are reset; verified
//! work in other modules and any existing portfolio entry are untouched. The
//! outgoing candidate's record is retained with a withdrawn marker for audit.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::ops::Range;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::candidate::CandidateRow;
use crate::models::engagement::{
    initial_task_progress, EngagementRow, EngagementStatus, TaskProgress, TaskState,
};
use crate::models::project::ProjectRow;

/// Returns the target module's task states to `not_started`, leaving every
/// other index untouched.
pub fn reset_module_tasks(
    progress: &TaskProgress,
    range: Range<u32>,
    now: DateTime<Utc>,
) -> TaskProgress {
    let mut reset = progress.clone();
    for index in range {
        reset.insert(index, TaskState::not_started(now));
    }
    reset
}

/// Candidates eligible to take over a module: holders of an applied or
/// shortlisted engagement on the project.
pub async fn eligible_replacements(
    db: &PgPool,
    project_id: Uuid,
) -> Result<Vec<CandidateRow>, AppError> {
    Ok(sqlx::query_as(
        r#"
        SELECT c.* FROM candidates c
        JOIN engagements e ON e.candidate_id = c.id
        WHERE e.project_id = $1 AND e.status IN ('applied', 'shortlisted')
        ORDER BY c.id
        "#,
    )
    .bind(project_id)
    .fetch_all(db)
    .await?)
}

/// Migrates module ownership from `old_candidate_id` to `new_candidate_id`.
pub async fn switch_candidate(
    db: &PgPool,
    project_id: Uuid,
    module_id: Uuid,
    old_candidate_id: Uuid,
    new_candidate_id: Uuid,
) -> Result<(), AppError> {
    if old_candidate_id == new_candidate_id {
        return Err(AppError::Validation(
            "Replacement candidate must differ from the outgoing candidate".to_string(),
        ));
    }

    let project: ProjectRow = sqlx::query_as("SELECT * FROM projects WHERE id = $1")
        .bind(project_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project {project_id} not found")))?;

    let range = project.module_task_range(module_id).ok_or_else(|| {
        AppError::NotFound(format!("Module {module_id} not found on project {project_id}"))
    })?;

    let old: EngagementRow =
        sqlx::query_as("SELECT * FROM engagements WHERE project_id = $1 AND candidate_id = $2")
            .bind(project_id)
            .bind(old_candidate_id)
            .fetch_optional(db)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "No engagement for candidate {old_candidate_id} on project {project_id}"
                ))
            })?;

    match old.status_enum() {
        Some(EngagementStatus::Hired) | Some(EngagementStatus::WorkSubmitted) => {}
        _ => {
            return Err(AppError::Validation(format!(
                "Outgoing engagement is {} and cannot be reassigned",
                old.status
            )))
        }
    }

    let now = Utc::now();
    let reset = reset_module_tasks(&old.task_progress.0, range, now);
    let fresh = initial_task_progress(project.total_task_count(), now);

    let mut tx = db.begin().await?;

    // Single-attempt CAS: a concurrent reassignment of this module bumped the
    // version first and wins; this caller gets a conflict, not a merge.
    let withdrew = sqlx::query(
        r#"
        UPDATE engagements
        SET task_progress = $1, withdrawn_at = $2, version = version + 1
        WHERE project_id = $3 AND candidate_id = $4 AND version = $5
        "#,
    )
    .bind(Json(&reset))
    .bind(now)
    .bind(project_id)
    .bind(old_candidate_id)
    .bind(old.version)
    .execute(&mut *tx)
    .await?;

    if withdrew.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(AppError::Conflict(format!(
            "Module {module_id} was concurrently reassigned"
        )));
    }

    // Eligibility is enforced by the conditional update itself: only an
    // applied/shortlisted engagement can be promoted, so a candidate already
    // hired (or absent) fails atomically with the eligibility read.
    let hired = sqlx::query(
        r#"
        UPDATE engagements
        SET status = 'hired', hired_at = $1, task_progress = $2, version = version + 1
        WHERE project_id = $3 AND candidate_id = $4 AND status IN ('applied', 'shortlisted')
        "#,
    )
    .bind(now)
    .bind(Json(&fresh))
    .bind(project_id)
    .bind(new_candidate_id)
    .execute(&mut *tx)
    .await?;

    if hired.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(AppError::Validation(format!(
            "Candidate {new_candidate_id} is not eligible (requires an applied or shortlisted engagement)"
        )));
    }

    sqlx::query(
        r#"
        INSERT INTO candidate_engagements (candidate_id, project_id)
        VALUES ($1, $2)
        ON CONFLICT (candidate_id, project_id) DO NOTHING
        "#,
    )
    .bind(new_candidate_id)
    .bind(project_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        "Module {module_id} reassigned from {old_candidate_id} to {new_candidate_id} \
         on project {project_id}"
    );
    Ok(())
}
