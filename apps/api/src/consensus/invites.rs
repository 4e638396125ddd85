//! Invite persistence and the accept/reject consensus protocol.
//!
//! Inviting a squad writes the proposal and every member's invite record in one
//! transaction — a partial fan-out would leave a member unaware of a squad they
//! are nominally part of.
//!
//! Responses run under optimistic compare-and-swap on the proposal's version
//! column: two members answering concurrently must never overwrite each other's
//! status. The transition into `active` fires idempotent side effects
//! (engagement upsert, candidate index row) for every member, so a retry after
//! a partial failure is safe.

use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::engagement::initial_task_progress;
use crate::models::project::ProjectRow;
use crate::models::squad::{
    AssignmentStatus, InviteRow, MemberAssignment, SquadDraft, SquadProposalRow, SquadStatus,
};

const MAX_RESPOND_RETRIES: u32 = 3;

/// Persists a squad draft as an invited proposal plus one invite record per
/// member, transactionally.
pub async fn invite_squad(
    db: &PgPool,
    project_id: Uuid,
    draft: &SquadDraft,
) -> Result<Uuid, AppError> {
    let project: ProjectRow = sqlx::query_as("SELECT * FROM projects WHERE id = $1")
        .bind(project_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project {project_id} not found")))?;

    validate_for_invite(&project, draft)?;

    let members: Vec<MemberAssignment> = draft
        .members
        .iter()
        .map(|m| MemberAssignment {
            role_name: m.role_name.clone(),
            candidate_id: m.candidate_id,
            match_reason: m.match_reason.clone(),
            status: AssignmentStatus::Pending,
        })
        .collect();

    let proposal_id = Uuid::new_v4();
    let mut tx = db.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO squad_proposals (id, project_id, members, harmony_score, status, version)
        VALUES ($1, $2, $3, $4, $5, 0)
        "#,
    )
    .bind(proposal_id)
    .bind(project_id)
    .bind(Json(&members))
    .bind(draft.harmony_score as i32)
    .bind(SquadStatus::Invited.as_str())
    .execute(&mut *tx)
    .await?;

    for member in &members {
        sqlx::query(
            r#"
            INSERT INTO invites (id, proposal_id, project_id, candidate_id, role_name, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(proposal_id)
        .bind(project_id)
        .bind(member.candidate_id)
        .bind(&member.role_name)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(
        "Invited squad {proposal_id} for project {project_id} ({} members)",
        members.len()
    );

    Ok(proposal_id)
}

/// Role-coverage and no-duplicate checks on an inbound draft. Drafts straight
/// from the matcher already hold these, but the invite step is a separate
/// request and re-validates before persisting.
fn validate_for_invite(project: &ProjectRow, draft: &SquadDraft) -> Result<(), AppError> {
    let roles = &project.roles.0;
    if draft.members.len() != roles.len() {
        return Err(AppError::Validation(format!(
            "Proposal must assign all {} roles, got {} members",
            roles.len(),
            draft.members.len()
        )));
    }
    let mut seen_roles = std::collections::HashSet::new();
    let mut seen_candidates = std::collections::HashSet::new();
    for member in &draft.members {
        if !roles.iter().any(|r| r.name == member.role_name) {
            return Err(AppError::Validation(format!(
                "Unknown role '{}'",
                member.role_name
            )));
        }
        if !seen_roles.insert(member.role_name.as_str()) {
            return Err(AppError::Validation(format!(
                "Role '{}' assigned twice",
                member.role_name
            )));
        }
        if !seen_candidates.insert(member.candidate_id) {
            return Err(AppError::Validation(format!(
                "Candidate {} appears twice",
                member.candidate_id
            )));
        }
    }
    Ok(())
}

/// How a member's decision applied against the current proposal state.
#[derive(Debug, PartialEq, Eq)]
pub enum DecisionApply {
    /// The member's status changed; the proposal must be re-persisted.
    Updated,
    /// Same decision already recorded — idempotent repeat, nothing to write.
    Repeat,
}

/// Applies a member's decision to the member list in memory.
pub fn apply_decision(
    members: &mut [MemberAssignment],
    candidate_id: Uuid,
    decision: AssignmentStatus,
) -> Result<DecisionApply, AppError> {
    let member = members
        .iter_mut()
        .find(|m| m.candidate_id == candidate_id)
        .ok_or_else(|| {
            AppError::Validation(format!("Candidate {candidate_id} is not a squad member"))
        })?;

    match (member.status, decision) {
        (AssignmentStatus::Pending, AssignmentStatus::Accepted)
        | (AssignmentStatus::Pending, AssignmentStatus::Rejected) => {
            member.status = decision;
            Ok(DecisionApply::Updated)
        }
        (current, new) if current == new => Ok(DecisionApply::Repeat),
        (current, _) => Err(AppError::Validation(format!(
            "Decision already recorded as {current:?} and cannot be changed"
        ))),
    }
}

/// Whether an idempotent repeat against a settled squad must replay the hire
/// side effects. A prior response may have committed `active` and then failed
/// partway through hiring; only `active` squads have effects to repair.
fn repeat_replays_activation(status: SquadStatus) -> bool {
    status == SquadStatus::Active
}

/// Derives squad-level status from member statuses. Any rejection makes the
/// squad `partial_reject` (terminal — the recruiter re-invites); only full
/// acceptance activates it.
pub fn derive_squad_status(members: &[MemberAssignment]) -> SquadStatus {
    if members
        .iter()
        .any(|m| m.status == AssignmentStatus::Rejected)
    {
        SquadStatus::PartialReject
    } else if members
        .iter()
        .all(|m| m.status == AssignmentStatus::Accepted)
    {
        SquadStatus::Active
    } else {
        SquadStatus::Invited
    }
}

/// Records one member's accept/reject under optimistic CAS and derives the new
/// squad status. On the transition into `active`, hires every member.
/// Exhausting the retry budget surfaces a retryable conflict.
pub async fn respond_to_invite(
    db: &PgPool,
    proposal_id: Uuid,
    candidate_id: Uuid,
    decision: AssignmentStatus,
) -> Result<SquadStatus, AppError> {
    if decision == AssignmentStatus::Pending {
        return Err(AppError::Validation(
            "Decision must be 'accepted' or 'rejected'".to_string(),
        ));
    }

    for _attempt in 0..MAX_RESPOND_RETRIES {
        let row: SquadProposalRow = sqlx::query_as("SELECT * FROM squad_proposals WHERE id = $1")
            .bind(proposal_id)
            .fetch_optional(db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Squad proposal {proposal_id} not found")))?;

        let squad_status = SquadStatus::parse(&row.status).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "Corrupt squad status '{}' on proposal {proposal_id}",
                row.status
            ))
        })?;

        let mut members = row.members.0.clone();

        if squad_status != SquadStatus::Invited {
            // Terminal squad: accept only idempotent repeats of a recorded decision.
            let member = members
                .iter()
                .find(|m| m.candidate_id == candidate_id)
                .ok_or_else(|| {
                    AppError::Validation(format!("Candidate {candidate_id} is not a squad member"))
                })?;
            if member.status == decision {
                // Every activation write is conflict-safe, so the repeat
                // replays them; with nothing missing this is a no-op.
                if repeat_replays_activation(squad_status) {
                    activate_squad(db, row.project_id, &members).await?;
                }
                return Ok(squad_status);
            }
            return Err(AppError::Validation(format!(
                "Squad is {} and no longer accepting responses",
                squad_status.as_str()
            )));
        }

        match apply_decision(&mut members, candidate_id, decision)? {
            DecisionApply::Repeat => return Ok(squad_status),
            DecisionApply::Updated => {}
        }

        let new_status = derive_squad_status(&members);

        let result = sqlx::query(
            r#"
            UPDATE squad_proposals
            SET members = $1, status = $2, version = version + 1
            WHERE id = $3 AND version = $4
            "#,
        )
        .bind(Json(&members))
        .bind(new_status.as_str())
        .bind(proposal_id)
        .bind(row.version)
        .execute(db)
        .await?;

        if result.rows_affected() == 0 {
            // Lost the race against another member's response; reload and retry.
            warn!("CAS conflict on proposal {proposal_id}, retrying");
            continue;
        }

        sqlx::query("UPDATE invites SET status = $1 WHERE proposal_id = $2 AND candidate_id = $3")
            .bind(match decision {
                AssignmentStatus::Accepted => "accepted",
                _ => "rejected",
            })
            .bind(proposal_id)
            .bind(candidate_id)
            .execute(db)
            .await?;

        if new_status == SquadStatus::Active {
            activate_squad(db, row.project_id, &members).await?;
        }

        info!(
            "Candidate {candidate_id} responded {decision:?} on proposal {proposal_id}; squad now {}",
            new_status.as_str()
        );
        return Ok(new_status);
    }

    Err(AppError::Conflict(format!(
        "Could not record response for proposal {proposal_id} after {MAX_RESPOND_RETRIES} attempts"
    )))
}

/// Acceptance side effects, idempotent per member: upsert an engagement to
/// `hired` with a fresh full-job progress map, and add the project to the
/// candidate's engagement index. Safe to repeat after a partial failure.
async fn activate_squad(
    db: &PgPool,
    project_id: Uuid,
    members: &[MemberAssignment],
) -> Result<(), AppError> {
    let project: ProjectRow = sqlx::query_as("SELECT * FROM projects WHERE id = $1")
        .bind(project_id)
        .fetch_one(db)
        .await?;

    let now = Utc::now();
    let progress = initial_task_progress(project.total_task_count(), now);

    for member in members {
        // New engagements start hired; pre-existing applied/shortlisted rows are
        // upgraded. A row already hired (or further along) is left untouched.
        sqlx::query(
            r#"
            INSERT INTO engagements (project_id, candidate_id, status, task_progress, version, hired_at)
            VALUES ($1, $2, 'hired', $3, 0, $4)
            ON CONFLICT (project_id, candidate_id) DO UPDATE
            SET status = 'hired',
                task_progress = EXCLUDED.task_progress,
                hired_at = EXCLUDED.hired_at,
                version = engagements.version + 1
            WHERE engagements.status IN ('applied', 'shortlisted')
            "#,
        )
        .bind(project_id)
        .bind(member.candidate_id)
        .bind(Json(&progress))
        .bind(now)
        .execute(db)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO candidate_engagements (candidate_id, project_id)
            VALUES ($1, $2)
            ON CONFLICT (candidate_id, project_id) DO NOTHING
            "#,
        )
        .bind(member.candidate_id)
        .bind(project_id)
        .execute(db)
        .await?;
    }

    info!(
        "Squad active on project {project_id}: hired {} members",
        members.len()
    );
    Ok(())
}

/// All invite records visible to one candidate, newest first.
pub async fn list_invites(db: &PgPool, candidate_id: Uuid) -> Result<Vec<InviteRow>, AppError> {
    Ok(sqlx::query_as(
        "SELECT * FROM invites WHERE candidate_id = $1 ORDER BY created_at DESC",
    )
    .bind(candidate_id)
    .fetch_all(db)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(statuses: &[AssignmentStatus]) -> Vec<MemberAssignment> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, status)| MemberAssignment {
                role_name: format!("Role {i}"),
                candidate_id: Uuid::new_v4(),
                match_reason: "fits".to_string(),
                status: *status,
            })
            .collect()
    }

    #[test]
    fn test_all_pending_stays_invited() {
        let m = members(&[AssignmentStatus::Pending, AssignmentStatus::Pending]);
        assert_eq!(derive_squad_status(&m), SquadStatus::Invited);
    }

    #[test]
    fn test_partial_accept_stays_invited() {
        let m = members(&[AssignmentStatus::Accepted, AssignmentStatus::Pending]);
        assert_eq!(derive_squad_status(&m), SquadStatus::Invited);
    }

    #[test]
    fn test_all_accepted_goes_active() {
        let m = members(&[AssignmentStatus::Accepted, AssignmentStatus::Accepted]);
        assert_eq!(derive_squad_status(&m), SquadStatus::Active);
    }

    #[test]
    fn test_any_rejection_is_partial_reject_even_with_pending() {
        let m = members(&[
            AssignmentStatus::Accepted,
            AssignmentStatus::Rejected,
            AssignmentStatus::Pending,
        ]);
        assert_eq!(derive_squad_status(&m), SquadStatus::PartialReject);
    }

    #[test]
    fn test_apply_decision_updates_pending_member() {
        let mut m = members(&[AssignmentStatus::Pending]);
        let id = m[0].candidate_id;
        let outcome = apply_decision(&mut m, id, AssignmentStatus::Accepted).unwrap();
        assert_eq!(outcome, DecisionApply::Updated);
        assert_eq!(m[0].status, AssignmentStatus::Accepted);
    }

    #[test]
    fn test_apply_decision_same_decision_is_idempotent_repeat() {
        let mut m = members(&[AssignmentStatus::Accepted]);
        let id = m[0].candidate_id;
        let outcome = apply_decision(&mut m, id, AssignmentStatus::Accepted).unwrap();
        assert_eq!(outcome, DecisionApply::Repeat);
        assert_eq!(m[0].status, AssignmentStatus::Accepted);
    }

    #[test]
    fn test_apply_decision_cannot_flip_settled_decision() {
        let mut m = members(&[AssignmentStatus::Accepted]);
        let id = m[0].candidate_id;
        let err = apply_decision(&mut m, id, AssignmentStatus::Rejected);
        assert!(matches!(err, Err(AppError::Validation(_))));
        assert_eq!(m[0].status, AssignmentStatus::Accepted);
    }

    #[test]
    fn test_apply_decision_non_member_rejected() {
        let mut m = members(&[AssignmentStatus::Pending]);
        let err = apply_decision(&mut m, Uuid::new_v4(), AssignmentStatus::Accepted);
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_repeat_on_active_squad_replays_hire_side_effects() {
        // An accept repeated against an already-active squad must re-run the
        // hire writes: the first attempt may have committed `active` and then
        // failed before hiring every member.
        assert!(repeat_replays_activation(SquadStatus::Active));
    }

    #[test]
    fn test_repeat_on_non_active_squad_has_nothing_to_replay() {
        assert!(!repeat_replays_activation(SquadStatus::Invited));
        assert!(!repeat_replays_activation(SquadStatus::PartialReject));
    }

    #[test]
    fn test_last_acceptance_transitions_to_active() {
        // Simulates the serialized outcome of two concurrent accepts on a
        // role-2 squad: whichever CAS lands second sees both accepted and is
        // the single Active transition.
        let mut m = members(&[AssignmentStatus::Pending, AssignmentStatus::Pending]);
        let first = m[0].candidate_id;
        let second = m[1].candidate_id;

        apply_decision(&mut m, first, AssignmentStatus::Accepted).unwrap();
        assert_eq!(derive_squad_status(&m), SquadStatus::Invited);

        apply_decision(&mut m, second, AssignmentStatus::Accepted).unwrap();
        assert_eq!(derive_squad_status(&m), SquadStatus::Active);
    }
}
