//! Terminal completion detection and one-time portfolio synthesis.
//!
//! The review path spawns this after a task verifies; the spawn is only a
//! hint. Completion is an explicit post-condition: every global index must be
//! verified, re-checked here against the store, because tasks are reviewed in
//! any order.
//!
//! The portfolio row is claimed with a conditional create carrying a
//! deterministic fallback payload; the Oracle then enriches the row only for
//! the caller that won the claim. Two racing reviews of the final task can
//! therefore never produce two records. Oracle failure leaves the fallback in
//! place and is logged for manual regeneration — the reviewer never sees it.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::engagement::{TaskProgress, TaskStatus};
use crate::models::project::{total_task_count, ModuleSpec, ProjectRow};
use crate::oracle::{SummaryBrief, WorkSummary};
use crate::state::AppState;

/// True when every global index 0..total is verified. A job with zero tasks is
/// never considered verified.
pub fn all_tasks_verified(progress: &TaskProgress, total: u32) -> bool {
    total > 0
        && (0..total)
            .all(|i| matches!(progress.get(&i), Some(t) if t.status == TaskStatus::Verified))
}

/// Deterministic portfolio payload used as the claim row and as the permanent
/// record whenever the Oracle is unavailable. Built only from project shape —
/// anonymized by construction.
pub fn fallback_portfolio(modules: &[ModuleSpec], description: &str) -> WorkSummary {
    let task_total = total_task_count(modules);
    let module_lines: Vec<String> = modules
        .iter()
        .map(|m| format!("{}: {} verified deliverable(s)", m.title, m.tasks.len()))
        .collect();

    let mut tags: Vec<String> = Vec::new();
    for word in description.split_whitespace() {
        let word = word
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if word.len() >= 4 && !tags.contains(&word) {
            tags.push(word);
        }
        if tags.len() >= 5 {
            break;
        }
    }

    WorkSummary {
        abstract_text: format!(
            "Completed a {}-module collaborative engagement with {task_total} verified deliverables.",
            modules.len()
        ),
        breakdown: module_lines.join("\n"),
        tags,
    }
}

/// Detached entrypoint: never panics the runtime, never returns an error to a
/// caller — there is no caller left to tell.
pub async fn synthesize_completion(state: AppState, project_id: Uuid, candidate_id: Uuid) {
    if let Err(e) = run(&state, project_id, candidate_id).await {
        warn!(
            "Completion synthesis failed for candidate {candidate_id} on project {project_id}: {e}"
        );
    }
}

async fn run(state: &AppState, project_id: Uuid, candidate_id: Uuid) -> Result<(), AppError> {
    let project: ProjectRow = sqlx::query_as("SELECT * FROM projects WHERE id = $1")
        .bind(project_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project {project_id} not found")))?;

    let progress: Option<(sqlx::types::Json<TaskProgress>,)> = sqlx::query_as(
        "SELECT task_progress FROM engagements WHERE project_id = $1 AND candidate_id = $2",
    )
    .bind(project_id)
    .bind(candidate_id)
    .fetch_optional(&state.db)
    .await?;

    let progress = match progress {
        Some((json,)) => json.0,
        None => return Ok(()), // engagement gone; nothing to synthesize
    };

    let total = project.total_task_count();
    if !all_tasks_verified(&progress, total) {
        // Trigger fired out of order or work was reset; not actually complete.
        return Ok(());
    }

    let now = Utc::now();

    // Terminal transition, idempotent: completed_at is set once.
    sqlx::query(
        r#"
        UPDATE engagements
        SET status = 'completed', completed_at = COALESCE(completed_at, $1), version = version + 1
        WHERE project_id = $2 AND candidate_id = $3 AND status <> 'completed'
        "#,
    )
    .bind(now)
    .bind(project_id)
    .bind(candidate_id)
    .execute(&state.db)
    .await?;

    // Conditional create: whoever inserts the row owns enrichment; everyone
    // else stops here. Never read-then-write.
    let fallback = fallback_portfolio(&project.modules.0, &project.description);
    let claimed = sqlx::query(
        r#"
        INSERT INTO portfolio_entries
            (candidate_id, project_id, abstract_text, breakdown, skill_tags, source_score, verified_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (candidate_id, project_id) DO NOTHING
        "#,
    )
    .bind(candidate_id)
    .bind(project_id)
    .bind(&fallback.abstract_text)
    .bind(&fallback.breakdown)
    .bind(&fallback.tags)
    .bind(total as i32)
    .bind(now)
    .execute(&state.db)
    .await?;

    if claimed.rows_affected() == 0 {
        return Ok(()); // entry already exists for this (candidate, project)
    }

    info!("Engagement completed: candidate {candidate_id}, project {project_id}");

    let brief = SummaryBrief::from_modules(&project.description, &project.modules.0);
    if let Err(e) = enrich_portfolio(state, &brief, candidate_id, project_id).await {
        warn!(
            "Portfolio summarization failed, keeping fallback payload for manual \
             regeneration (candidate {candidate_id}, project {project_id}): {e}"
        );
    }

    Ok(())
}

/// Oracle enrichment of the claimed portfolio row. Only the claim winner gets
/// here, so the update can never touch another caller's entry.
async fn enrich_portfolio(
    state: &AppState,
    brief: &SummaryBrief,
    candidate_id: Uuid,
    project_id: Uuid,
) -> Result<(), AppError> {
    let summary = state
        .oracle
        .summarize_completed_work(brief)
        .await
        .map_err(|e| AppError::Oracle(e.to_string()))?;

    sqlx::query(
        r#"
        UPDATE portfolio_entries
        SET abstract_text = $1, breakdown = $2, skill_tags = $3
        WHERE candidate_id = $4 AND project_id = $5
        "#,
    )
    .bind(&summary.abstract_text)
    .bind(&summary.breakdown)
    .bind(&summary.tags)
    .bind(candidate_id)
    .bind(project_id)
    .execute(&state.db)
    .await?;

    info!("Portfolio entry enriched for candidate {candidate_id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::engagement::{initial_task_progress, TaskState};
    use crate::models::project::TaskSpec;

    fn verified(now: chrono::DateTime<Utc>) -> TaskState {
        TaskState {
            status: TaskStatus::Verified,
            submission_note: None,
            feedback: None,
            updated_at: now,
        }
    }

    fn modules(task_counts: &[usize]) -> Vec<ModuleSpec> {
        task_counts
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
                        payout: 0,
                    })
                    .collect(),
            })
            .collect()
    }

    #[test]
    fn test_all_tasks_verified_happy_path() {
        let now = Utc::now();
        let mut progress = initial_task_progress(2, now);
        progress.insert(0, verified(now));
        progress.insert(1, verified(now));
        assert!(all_tasks_verified(&progress, 2));
    }

    #[test]
    fn test_one_unverified_task_blocks_completion() {
        let now = Utc::now();
        let mut progress = initial_task_progress(3, now);
        progress.insert(0, verified(now));
        progress.insert(2, verified(now));
        // index 1 reviewed out of order and still pending
        assert!(!all_tasks_verified(&progress, 3));
    }

    #[test]
    fn test_missing_index_blocks_completion() {
        let now = Utc::now();
        let mut progress = TaskProgress::new();
        progress.insert(0, verified(now));
        assert!(!all_tasks_verified(&progress, 2));
    }

    #[test]
    fn test_zero_task_job_is_never_complete() {
        assert!(!all_tasks_verified(&TaskProgress::new(), 0));
    }

    #[test]
    fn test_last_index_alone_is_not_completion() {
        // The "last index verified" trigger must not imply completion.
        let now = Utc::now();
        let mut progress = initial_task_progress(4, now);
        progress.insert(3, verified(now));
        assert!(!all_tasks_verified(&progress, 4));
    }

    #[test]
    fn test_fallback_portfolio_is_deterministic_and_anonymous() {
        let m = modules(&[2, 3]);
        let a = fallback_portfolio(&m, "Build a payments reconciliation service");
        let b = fallback_portfolio(&m, "Build a payments reconciliation service");
        assert_eq!(a.abstract_text, b.abstract_text);
        assert_eq!(a.tags, b.tags);
        assert!(a.abstract_text.contains("2-module"));
        assert!(a.abstract_text.contains("5 verified"));
    }

    #[test]
    fn test_fallback_tags_are_lowercased_and_bounded() {
        let m = modules(&[1]);
        let summary = fallback_portfolio(
            &m,
            "Design Build Deploy Operate Measure Iterate Document Review",
        );
        assert!(summary.tags.len() <= 5);
        assert!(summary.tags.iter().all(|t| t.chars().all(|c| !c.is_uppercase())));
    }

    #[test]
    fn test_fallback_breakdown_lists_each_module() {
        let m = modules(&[1, 2, 3]);
        let summary = fallback_portfolio(&m, "desc");
        assert_eq!(summary.breakdown.lines().count(), 3);
    }
}
