//! Squad Matcher — orchestrates pool fetch, Oracle suggestion, and the
//! heuristic backstop into 0-3 ranked squad drafts.
//!
//! Flow: preconditions → fetch_pool → Oracle propose (validated per draft) →
//!       heuristic fallback on any Oracle failure or zero valid drafts.
//!
//! Insufficient candidates is an expected terminal outcome (Ok with a reason),
//! never an error. Oracle unavailability is never surfaced to the caller.

use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::matching::{heuristic, pool};
use crate::models::candidate::CandidateRow;
use crate::models::project::{ProjectRow, RoleSpec};
use crate::models::squad::SquadDraft;
use crate::oracle::{OracleClient, PoolCandidate, SquadBrief};

/// Output of matching: drafts are not yet persisted; the invite step is explicit.
#[derive(Debug, Serialize)]
pub struct MatchOutcome {
    pub project_id: Uuid,
    pub proposals: Vec<SquadDraft>,
    /// Explains an empty proposal list ("insufficient candidates").
    pub reason: Option<String>,
    /// "oracle" | "heuristic" — provenance for downstream consumers.
    pub backend: String,
}

/// Produces up to 3 ranked squad drafts for a collaborative project.
pub async fn match_squads(
    db: &PgPool,
    oracle: &OracleClient,
    project_id: Uuid,
) -> Result<MatchOutcome, AppError> {
    let project: ProjectRow = sqlx::query_as("SELECT * FROM projects WHERE id = $1")
        .bind(project_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project {project_id} not found")))?;

    if !project.collaborative {
        return Err(AppError::Validation(
            "Project is not flagged collaborative".to_string(),
        ));
    }
    let roles = &project.roles.0;
    if roles.len() < 2 {
        return Err(AppError::Validation(
            "Squad matching requires at least 2 roles".to_string(),
        ));
    }

    let pool = pool::fetch_pool(db, roles).await.map_err(AppError::Internal)?;
    info!(
        "Matching project {project_id}: {} roles, pool of {}",
        roles.len(),
        pool.len()
    );

    if pool.len() < roles.len() {
        return Ok(MatchOutcome {
            project_id,
            proposals: vec![],
            reason: Some(format!(
                "Insufficient candidates: pool of {} cannot cover {} roles",
                pool.len(),
                roles.len()
            )),
            backend: "none".to_string(),
        });
    }

    // Oracle attempt — every failure mode (timeout, malformed payload, zero
    // structurally valid drafts) falls back to the heuristic assigner.
    match propose_via_oracle(oracle, &project, roles, &pool).await {
        Some(proposals) => Ok(MatchOutcome {
            project_id,
            proposals,
            reason: None,
            backend: "oracle".to_string(),
        }),
        None => {
            let proposals = heuristic::propose(roles, &pool);
            Ok(MatchOutcome {
                project_id,
                proposals,
                reason: None,
                backend: "heuristic".to_string(),
            })
        }
    }
}

async fn propose_via_oracle(
    oracle: &OracleClient,
    project: &ProjectRow,
    roles: &[RoleSpec],
    pool: &[CandidateRow],
) -> Option<Vec<SquadDraft>> {
    let brief = SquadBrief {
        project_title: project.title.clone(),
        project_description: project.description.clone(),
        roles: roles.to_vec(),
        pool: pool.iter().map(PoolCandidate::from_row).collect(),
    };

    let drafts = match oracle.propose_squads(&brief).await {
        Ok(drafts) => drafts,
        Err(e) => {
            warn!("Oracle squad proposal failed, falling back to heuristic: {e}");
            return None;
        }
    };

    let pool_ids: HashSet<Uuid> = pool.iter().map(|c| c.id).collect();
    let valid: Vec<SquadDraft> = drafts
        .into_iter()
        .filter(|draft| match validate_draft(roles, &pool_ids, draft) {
            Ok(()) => true,
            Err(reason) => {
                warn!("Discarding invalid Oracle proposal: {reason}");
                false
            }
        })
        .take(heuristic::MAX_PROPOSALS)
        .collect();

    if valid.is_empty() {
        warn!("Oracle returned no structurally valid proposals, falling back to heuristic");
        None
    } else {
        Some(valid)
    }
}

/// Structural validation of a squad draft: every role covered exactly once, no
/// duplicate candidate, every candidate drawn from the fetched pool, score in
/// range. Oracle output is never trusted without passing this.
pub fn validate_draft(
    roles: &[RoleSpec],
    pool_ids: &HashSet<Uuid>,
    draft: &SquadDraft,
) -> Result<(), String> {
    if draft.members.len() != roles.len() {
        return Err(format!(
            "expected {} members, got {}",
            roles.len(),
            draft.members.len()
        ));
    }
    if draft.harmony_score > 100 {
        return Err(format!("harmony_score {} out of range", draft.harmony_score));
    }

    let mut seen_roles: HashSet<&str> = HashSet::new();
    let mut seen_candidates: HashSet<Uuid> = HashSet::new();

    for member in &draft.members {
        if !roles.iter().any(|r| r.name == member.role_name) {
            return Err(format!("unknown role '{}'", member.role_name));
        }
        if !seen_roles.insert(member.role_name.as_str()) {
            return Err(format!("role '{}' assigned twice", member.role_name));
        }
        if !seen_candidates.insert(member.candidate_id) {
            return Err(format!(
                "candidate {} appears twice in one proposal",
                member.candidate_id
            ));
        }
        if !pool_ids.contains(&member.candidate_id) {
            return Err(format!(
                "candidate {} is not in the fetched pool",
                member.candidate_id
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::squad::DraftAssignment;

    fn roles(names: &[&str]) -> Vec<RoleSpec> {
        names
            .iter()
            .map(|n| RoleSpec {
                name: n.to_string(),
                description: String::new(),
                required_skills: vec![],
            })
            .collect()
    }

    fn draft(members: Vec<(&str, Uuid)>, score: u8) -> SquadDraft {
        SquadDraft {
            members: members
                .into_iter()
                .map(|(role, id)| DraftAssignment {
                    role_name: role.to_string(),
                    candidate_id: id,
                    match_reason: "fits".to_string(),
                })
                .collect(),
            harmony_score: score,
        }
    }

    #[test]
    fn test_valid_draft_passes() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let pool_ids: HashSet<_> = [a, b].into_iter().collect();
        let d = draft(vec![("Backend", a), ("Frontend", b)], 80);
        assert!(validate_draft(&roles(&["Backend", "Frontend"]), &pool_ids, &d).is_ok());
    }

    #[test]
    fn test_duplicate_candidate_rejected() {
        let a = Uuid::new_v4();
        let pool_ids: HashSet<_> = [a].into_iter().collect();
        let d = draft(vec![("Backend", a), ("Frontend", a)], 80);
        let err = validate_draft(&roles(&["Backend", "Frontend"]), &pool_ids, &d).unwrap_err();
        assert!(err.contains("appears twice"));
    }

    #[test]
    fn test_missing_role_coverage_rejected() {
        let a = Uuid::new_v4();
        let pool_ids: HashSet<_> = [a].into_iter().collect();
        let d = draft(vec![("Backend", a)], 80);
        assert!(validate_draft(&roles(&["Backend", "Frontend"]), &pool_ids, &d).is_err());
    }

    #[test]
    fn test_role_assigned_twice_rejected() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let pool_ids: HashSet<_> = [a, b].into_iter().collect();
        let d = draft(vec![("Backend", a), ("Backend", b)], 80);
        let err = validate_draft(&roles(&["Backend", "Frontend"]), &pool_ids, &d).unwrap_err();
        assert!(err.contains("assigned twice"));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let pool_ids: HashSet<_> = [a, b].into_iter().collect();
        let d = draft(vec![("Backend", a), ("Designer", b)], 80);
        let err = validate_draft(&roles(&["Backend", "Frontend"]), &pool_ids, &d).unwrap_err();
        assert!(err.contains("unknown role"));
    }

    #[test]
    fn test_candidate_outside_pool_rejected() {
        let a = Uuid::new_v4();
        let pool_ids: HashSet<_> = [a].into_iter().collect();
        let d = draft(vec![("Backend", a), ("Frontend", Uuid::new_v4())], 80);
        let err = validate_draft(&roles(&["Backend", "Frontend"]), &pool_ids, &d).unwrap_err();
        assert!(err.contains("not in the fetched pool"));
    }

    #[test]
    fn test_out_of_range_score_rejected() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let pool_ids: HashSet<_> = [a, b].into_iter().collect();
        let d = draft(vec![("Backend", a), ("Frontend", b)], 101);
        assert!(validate_draft(&roles(&["Backend", "Frontend"]), &pool_ids, &d).is_err());
    }

    #[test]
    fn test_heuristic_drafts_always_validate() {
        use serde_json::json;
        let role_set = roles(&["Backend", "Frontend", "Infra"]);
        let pool: Vec<CandidateRow> = (0..9)
            .map(|_| CandidateRow {
                id: Uuid::new_v4(),
                name: "c".to_string(),
                skills: vec![],
                experience_level: "mid".to_string(),
                summary: String::new(),
                work_history: json!([]),
            })
            .collect();
        let pool_ids: HashSet<_> = pool.iter().map(|c| c.id).collect();

        for d in heuristic::propose(&role_set, &pool) {
            assert!(validate_draft(&role_set, &pool_ids, &d).is_ok());
        }
    }
}
