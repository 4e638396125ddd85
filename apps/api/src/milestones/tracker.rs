//! Per-task state machine and progress derivation.
//!
//! Task lifecycle: not_started → submitted → {verified, changes_requested};
//! changes_requested loops back to submitted on resubmission; verified is
//! terminal. Module- and job-level progress are derived reads — no module is
//! ever marked complete independent of its task states.
//!
//! Reviewing the task that completes a module settles that module's payout
//! (at most once, claim-marker guarded). Reviewing the task that completes the
//! whole job hands off to the detached completion synthesizer.

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use std::ops::Range;
use tracing::{info, warn};
use uuid::Uuid;

use crate::completion::synthesizer::{all_tasks_verified, synthesize_completion};
use crate::errors::AppError;
use crate::models::engagement::{
    EngagementRow, EngagementStatus, TaskProgress, TaskState, TaskStatus,
};
use crate::models::project::{module_payout_sum, ModuleSpec, ProjectRow};
use crate::state::AppState;

const MAX_TASK_RETRIES: u32 = 3;

/// Reviewer verdict on a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Verified,
    ChangesRequested,
}

// ────────────────────────────────────────────────────────────────────────────
// Pure state machine
// ────────────────────────────────────────────────────────────────────────────

/// Candidate submission: allowed from not_started and changes_requested.
pub fn apply_submission(
    state: &TaskState,
    note: Option<String>,
    now: DateTime<Utc>,
) -> Result<TaskState, AppError> {
    match state.status {
        TaskStatus::NotStarted | TaskStatus::ChangesRequested => Ok(TaskState {
            status: TaskStatus::Submitted,
            submission_note: note,
            feedback: state.feedback.clone(),
            updated_at: now,
        }),
        TaskStatus::Submitted => Err(AppError::Validation(
            "Task is already submitted and awaiting review".to_string(),
        )),
        TaskStatus::Verified => Err(AppError::Validation(
            "Task is verified and cannot be resubmitted".to_string(),
        )),
    }
}

/// Outcome of applying a review decision.
#[derive(Debug)]
pub enum ReviewApply {
    Updated(TaskState),
    /// Verifying an already-verified task: idempotent no-op for safe retries.
    Repeat,
}

/// Reviewer action: only submitted tasks can be reviewed; verified is terminal.
pub fn apply_review(
    state: &TaskState,
    decision: ReviewDecision,
    feedback: Option<String>,
    now: DateTime<Utc>,
) -> Result<ReviewApply, AppError> {
    match (state.status, decision) {
        (TaskStatus::Submitted, ReviewDecision::Verified) => Ok(ReviewApply::Updated(TaskState {
            status: TaskStatus::Verified,
            submission_note: state.submission_note.clone(),
            feedback,
            updated_at: now,
        })),
        (TaskStatus::Submitted, ReviewDecision::ChangesRequested) => {
            Ok(ReviewApply::Updated(TaskState {
                status: TaskStatus::ChangesRequested,
                submission_note: state.submission_note.clone(),
                feedback,
                updated_at: now,
            }))
        }
        (TaskStatus::Verified, ReviewDecision::Verified) => Ok(ReviewApply::Repeat),
        (TaskStatus::Verified, ReviewDecision::ChangesRequested) => Err(AppError::Validation(
            "Task is verified; verification is terminal".to_string(),
        )),
        (status, _) => Err(AppError::Validation(format!(
            "Task is {status:?} and cannot be reviewed"
        ))),
    }
}

/// True when every global index in `range` is verified.
pub fn range_verified(progress: &TaskProgress, range: Range<u32>) -> bool {
    range
        .clone()
        .all(|i| matches!(progress.get(&i), Some(t) if t.status == TaskStatus::Verified))
        && !range.is_empty()
}

// ────────────────────────────────────────────────────────────────────────────
// Derived progress
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ModuleProgress {
    pub module_id: Uuid,
    pub title: String,
    pub verified_count: u32,
    pub task_count: u32,
    pub complete: bool,
}

#[derive(Debug, Serialize)]
pub struct ProgressReport {
    pub project_id: Uuid,
    pub candidate_id: Uuid,
    pub engagement_status: String,
    pub modules: Vec<ModuleProgress>,
    pub verified_total: u32,
    pub task_total: u32,
}

/// Bottom-up progress derivation from task state. Never persisted.
pub fn derive_progress(
    project: &ProjectRow,
    candidate_id: Uuid,
    engagement_status: &str,
    progress: &TaskProgress,
) -> ProgressReport {
    let mut modules = Vec::new();
    let mut start = 0u32;
    let mut verified_total = 0u32;

    for module in project.modules.0.iter() {
        let task_count = module.tasks.len() as u32;
        let verified_count = (start..start + task_count)
            .filter(|i| matches!(progress.get(i), Some(t) if t.status == TaskStatus::Verified))
            .count() as u32;
        verified_total += verified_count;
        modules.push(ModuleProgress {
            module_id: module.id,
            title: module.title.clone(),
            verified_count,
            task_count,
            complete: task_count > 0 && verified_count == task_count,
        });
        start += task_count;
    }

    ProgressReport {
        project_id: project.id,
        candidate_id,
        engagement_status: engagement_status.to_string(),
        modules,
        verified_total,
        task_total: start,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Persistence entrypoints
// ────────────────────────────────────────────────────────────────────────────

async fn load_project(db: &PgPool, project_id: Uuid) -> Result<ProjectRow, AppError> {
    sqlx::query_as("SELECT * FROM projects WHERE id = $1")
        .bind(project_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project {project_id} not found")))
}

async fn load_engagement(
    db: &PgPool,
    project_id: Uuid,
    candidate_id: Uuid,
) -> Result<EngagementRow, AppError> {
    sqlx::query_as("SELECT * FROM engagements WHERE project_id = $1 AND candidate_id = $2")
        .bind(project_id)
        .bind(candidate_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No engagement for candidate {candidate_id} on project {project_id}"
            ))
        })
}

fn check_index(project: &ProjectRow, global_index: u32) -> Result<(), AppError> {
    let total = project.total_task_count();
    if global_index >= total {
        return Err(AppError::Validation(format!(
            "Task index {global_index} out of range (job has {total} tasks)"
        )));
    }
    Ok(())
}

fn check_engaged(engagement: &EngagementRow) -> Result<EngagementStatus, AppError> {
    if engagement.withdrawn_at.is_some() {
        return Err(AppError::Validation(
            "Engagement was withdrawn during reassignment and no longer accepts task mutations"
                .to_string(),
        ));
    }
    let status = engagement.status_enum().ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "Corrupt engagement status '{}'",
            engagement.status
        ))
    })?;
    match status {
        EngagementStatus::Hired | EngagementStatus::WorkSubmitted => Ok(status),
        other => Err(AppError::Validation(format!(
            "Engagement is {} — task mutations require an active hire",
            other.as_str()
        ))),
    }
}

/// Candidate submits work for one task.
pub async fn submit_task(
    db: &PgPool,
    project_id: Uuid,
    candidate_id: Uuid,
    global_index: u32,
    note: Option<String>,
) -> Result<(), AppError> {
    let project = load_project(db, project_id).await?;
    check_index(&project, global_index)?;

    for _attempt in 0..MAX_TASK_RETRIES {
        let engagement = load_engagement(db, project_id, candidate_id).await?;
        check_engaged(&engagement)?;

        let now = Utc::now();
        let mut progress = engagement.task_progress.0.clone();
        let current = progress
            .get(&global_index)
            .cloned()
            .unwrap_or_else(|| TaskState::not_started(now));
        let updated = apply_submission(&current, note.clone(), now)?;
        progress.insert(global_index, updated);

        let result = sqlx::query(
            r#"
            UPDATE engagements
            SET task_progress = $1, status = 'work_submitted', version = version + 1
            WHERE project_id = $2 AND candidate_id = $3 AND version = $4
            "#,
        )
        .bind(Json(&progress))
        .bind(project_id)
        .bind(candidate_id)
        .bind(engagement.version)
        .execute(db)
        .await?;

        if result.rows_affected() == 1 {
            info!("Task {global_index} submitted by {candidate_id} on project {project_id}");
            return Ok(());
        }
        warn!("CAS conflict on engagement ({project_id}, {candidate_id}), retrying submit");
    }

    Err(AppError::Conflict(format!(
        "Could not record submission after {MAX_TASK_RETRIES} attempts"
    )))
}

/// Reviewer verifies or requests changes on one submitted task.
///
/// This is the sole mutation entrypoint besides submission. The review itself
/// commits atomically; module payout and job completion run afterwards and can
/// never fail the review response.
pub async fn review_task(
    state: &AppState,
    project_id: Uuid,
    candidate_id: Uuid,
    global_index: u32,
    decision: ReviewDecision,
    feedback: Option<String>,
) -> Result<ProgressReport, AppError> {
    let project = load_project(&state.db, project_id).await?;
    check_index(&project, global_index)?;

    for _attempt in 0..MAX_TASK_RETRIES {
        let engagement = load_engagement(&state.db, project_id, candidate_id).await?;
        check_engaged(&engagement)?;

        let now = Utc::now();
        let mut progress = engagement.task_progress.0.clone();
        let current = progress
            .get(&global_index)
            .cloned()
            .unwrap_or_else(|| TaskState::not_started(now));

        let updated = match apply_review(&current, decision, feedback.clone(), now)? {
            ReviewApply::Updated(new_state) => new_state,
            ReviewApply::Repeat => {
                // A repeat can be a retry after the prior verification
                // committed but died before its side effects ran. Payout
                // settlement and the completion handoff are both idempotent,
                // so the repeat re-hands-off instead of short-circuiting.
                after_verification(state, &project, candidate_id, global_index, &progress).await;
                return Ok(derive_progress(
                    &project,
                    candidate_id,
                    &engagement.status,
                    &progress,
                ));
            }
        };
        progress.insert(global_index, updated);

        let result = sqlx::query(
            r#"
            UPDATE engagements
            SET task_progress = $1, version = version + 1
            WHERE project_id = $2 AND candidate_id = $3 AND version = $4
            "#,
        )
        .bind(Json(&progress))
        .bind(project_id)
        .bind(candidate_id)
        .bind(engagement.version)
        .execute(&state.db)
        .await?;

        if result.rows_affected() == 0 {
            warn!("CAS conflict on engagement ({project_id}, {candidate_id}), retrying review");
            continue;
        }

        if decision == ReviewDecision::Verified {
            after_verification(state, &project, candidate_id, global_index, &progress).await;
        }

        return Ok(derive_progress(
            &project,
            candidate_id,
            &engagement.status,
            &progress,
        ));
    }

    Err(AppError::Conflict(format!(
        "Could not record review after {MAX_TASK_RETRIES} attempts"
    )))
}

/// Post-review side effects: module payout settlement and, when every task in
/// the job is verified, the detached completion handoff. Best-effort — failures
/// are logged, never surfaced to the reviewer.
async fn after_verification(
    state: &AppState,
    project: &ProjectRow,
    candidate_id: Uuid,
    global_index: u32,
    progress: &TaskProgress,
) {
    if let Some(module) = project.module_for_index(global_index) {
        let range = project
            .module_task_range(module.id)
            .unwrap_or(global_index..global_index);
        if range_verified(progress, range) {
            if let Err(e) = settle_module_payout(state, project.id, module, candidate_id).await {
                warn!(
                    "Payout settlement failed for module {} (candidate {candidate_id}): {e}",
                    module.id
                );
            }
        }
    }

    if all_tasks_verified(progress, project.total_task_count()) {
        let state = state.clone();
        let project_id = project.id;
        tokio::spawn(async move {
            synthesize_completion(state, project_id, candidate_id).await;
        });
    }
}

/// Increments the candidate's ledger balance by the module payout sum, at most
/// once per (project, module). The claim marker is written first: at-most-once
/// is the ledger contract, a failed increment is logged for manual settlement.
async fn settle_module_payout(
    state: &AppState,
    project_id: Uuid,
    module: &ModuleSpec,
    candidate_id: Uuid,
) -> Result<(), AppError> {
    let amount = module_payout_sum(module);
    if amount <= 0 {
        return Ok(());
    }

    let claimed = sqlx::query(
        r#"
        INSERT INTO module_payouts (project_id, module_id, candidate_id, amount)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (project_id, module_id) DO NOTHING
        "#,
    )
    .bind(project_id)
    .bind(module.id)
    .bind(candidate_id)
    .bind(amount)
    .execute(&state.db)
    .await?;

    if claimed.rows_affected() == 0 {
        return Ok(()); // already settled
    }

    let mut conn = state
        .redis
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| AppError::Ledger(e.to_string()))?;
    let _: i64 = conn
        .incr(format!("balance:{candidate_id}"), amount)
        .await
        .map_err(|e| AppError::Ledger(e.to_string()))?;

    info!(
        "Module {} payout of {amount} credited to candidate {candidate_id}",
        module.id
    );
    Ok(())
}

/// Derived read of a candidate's progress across the job.
pub async fn get_progress(
    db: &PgPool,
    project_id: Uuid,
    candidate_id: Uuid,
) -> Result<ProgressReport, AppError> {
    let project = load_project(db, project_id).await?;
    let engagement = load_engagement(db, project_id, candidate_id).await?;
    Ok(derive_progress(
        &project,
        candidate_id,
        &engagement.status,
        &engagement.task_progress.0,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::engagement::initial_task_progress;
    use crate::models::project::{ModuleSpec, TaskSpec};
    use sqlx::types::Json;

    fn task(status: TaskStatus) -> TaskState {
        TaskState {
            status,
            submission_note: None,
            feedback: None,
            updated_at: Utc::now(),
        }
    }

    fn project(module_tasks: &[usize]) -> ProjectRow {
        ProjectRow {
            id: Uuid::new_v4(),
            title: "Test project".to_string(),
            description: "desc".to_string(),
            collaborative: true,
            roles: Json(vec![]),
            modules: Json(
                module_tasks
                    .iter()
                    .enumerate()
                    .map(|(i, n)| ModuleSpec {
                        id: Uuid::new_v4(),
                        title: format!("Module {i}"),
                        description: String::new(),
                        deadline: Utc::now(),
                        tasks: (0..*n)
                            .map(|t| TaskSpec {
                                description: format!("task {t}"),
                                payout: 500,
                            })
                            .collect(),
                    })
                    .collect(),
            ),
            created_at: Utc::now(),
        }
    }

    fn engagement(status: &str, withdrawn: bool) -> EngagementRow {
        let now = Utc::now();
        EngagementRow {
            project_id: Uuid::new_v4(),
            candidate_id: Uuid::new_v4(),
            status: status.to_string(),
            task_progress: Json(initial_task_progress(2, now)),
            version: 0,
            hired_at: Some(now),
            completed_at: None,
            withdrawn_at: withdrawn.then_some(now),
        }
    }

    #[test]
    fn test_submission_from_not_started() {
        let updated = apply_submission(
            &task(TaskStatus::NotStarted),
            Some("done".to_string()),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(updated.status, TaskStatus::Submitted);
        assert_eq!(updated.submission_note.as_deref(), Some("done"));
    }

    #[test]
    fn test_resubmission_after_changes_requested() {
        let updated =
            apply_submission(&task(TaskStatus::ChangesRequested), None, Utc::now()).unwrap();
        assert_eq!(updated.status, TaskStatus::Submitted);
    }

    #[test]
    fn test_double_submission_rejected() {
        let err = apply_submission(&task(TaskStatus::Submitted), None, Utc::now());
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_submission_of_verified_task_rejected() {
        let err = apply_submission(&task(TaskStatus::Verified), None, Utc::now());
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_review_verifies_submitted_task() {
        let apply = apply_review(
            &task(TaskStatus::Submitted),
            ReviewDecision::Verified,
            Some("good".to_string()),
            Utc::now(),
        )
        .unwrap();
        match apply {
            ReviewApply::Updated(s) => {
                assert_eq!(s.status, TaskStatus::Verified);
                assert_eq!(s.feedback.as_deref(), Some("good"));
            }
            ReviewApply::Repeat => panic!("expected update"),
        }
    }

    #[test]
    fn test_review_can_request_changes_then_loop_back() {
        let apply = apply_review(
            &task(TaskStatus::Submitted),
            ReviewDecision::ChangesRequested,
            Some("fix naming".to_string()),
            Utc::now(),
        )
        .unwrap();
        let changed = match apply {
            ReviewApply::Updated(s) => s,
            ReviewApply::Repeat => panic!("expected update"),
        };
        assert_eq!(changed.status, TaskStatus::ChangesRequested);

        // candidate resubmits, feedback is carried forward
        let resubmitted = apply_submission(&changed, Some("v2".to_string()), Utc::now()).unwrap();
        assert_eq!(resubmitted.status, TaskStatus::Submitted);
        assert_eq!(resubmitted.feedback.as_deref(), Some("fix naming"));
    }

    #[test]
    fn test_reverifying_verified_task_is_idempotent_repeat() {
        let apply = apply_review(
            &task(TaskStatus::Verified),
            ReviewDecision::Verified,
            None,
            Utc::now(),
        )
        .unwrap();
        assert!(matches!(apply, ReviewApply::Repeat));
    }

    #[test]
    fn test_repeat_only_arises_from_verified_state() {
        // The repeat path re-runs the post-verification side effects, so it
        // must be reachable only when the recorded state is already verified.
        for status in [
            TaskStatus::NotStarted,
            TaskStatus::Submitted,
            TaskStatus::ChangesRequested,
        ] {
            let apply = apply_review(&task(status), ReviewDecision::Verified, None, Utc::now());
            assert!(!matches!(apply, Ok(ReviewApply::Repeat)));
        }
    }

    #[test]
    fn test_verified_is_terminal_against_changes_requested() {
        let err = apply_review(
            &task(TaskStatus::Verified),
            ReviewDecision::ChangesRequested,
            None,
            Utc::now(),
        );
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_unsubmitted_task_cannot_be_reviewed() {
        let err = apply_review(
            &task(TaskStatus::NotStarted),
            ReviewDecision::Verified,
            None,
            Utc::now(),
        );
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_range_verified_requires_every_index() {
        let mut progress = initial_task_progress(4, Utc::now());
        progress.insert(0, task(TaskStatus::Verified));
        progress.insert(1, task(TaskStatus::Verified));
        assert!(range_verified(&progress, 0..2));
        assert!(!range_verified(&progress, 0..3));
        assert!(!range_verified(&progress, 2..4));
    }

    #[test]
    fn test_empty_range_is_not_verified() {
        let progress = initial_task_progress(2, Utc::now());
        assert!(!range_verified(&progress, 1..1));
    }

    #[test]
    fn test_withdrawn_engagement_rejects_task_mutations() {
        // Replaced candidates keep their row for audit but lose write access;
        // otherwise they could resubmit into the reassigned module's reset
        // range alongside the replacement.
        let e = engagement("hired", true);
        assert!(matches!(check_engaged(&e), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_active_hire_passes_engagement_gate() {
        let e = engagement("work_submitted", false);
        assert_eq!(check_engaged(&e).unwrap(), EngagementStatus::WorkSubmitted);
    }

    #[test]
    fn test_applied_engagement_cannot_mutate_tasks() {
        let e = engagement("applied", false);
        assert!(matches!(check_engaged(&e), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_derive_progress_counts_per_module() {
        let p = project(&[2, 3]);
        let candidate = Uuid::new_v4();
        let mut progress = initial_task_progress(5, Utc::now());
        progress.insert(0, task(TaskStatus::Verified));
        progress.insert(1, task(TaskStatus::Verified));
        progress.insert(2, task(TaskStatus::Submitted));

        let report = derive_progress(&p, candidate, "work_submitted", &progress);
        assert_eq!(report.modules.len(), 2);
        assert_eq!(report.modules[0].verified_count, 2);
        assert!(report.modules[0].complete);
        assert_eq!(report.modules[1].verified_count, 0);
        assert!(!report.modules[1].complete);
        assert_eq!(report.verified_total, 2);
        assert_eq!(report.task_total, 5);
    }

    #[test]
    fn test_module_completion_is_bottom_up_only() {
        // A module with zero verified tasks can never read as complete,
        // regardless of any other state.
        let p = project(&[3]);
        let progress = initial_task_progress(3, Utc::now());
        let report = derive_progress(&p, Uuid::new_v4(), "hired", &progress);
        assert!(!report.modules[0].complete);
    }
}
