//! Heuristic Assigner — deterministic fallback when the Oracle is degraded.
//!
//! Greedily pops one not-yet-used candidate per role for up to 3 proposal
//! slots. Its purpose is availability, not optimality: any valid candidate
//! fills a role, and production of proposals stops the moment the remaining
//! pool cannot cover every role. This is the correctness backstop the whole
//! matcher depends on — it must never emit an invalid proposal.

use crate::models::candidate::CandidateRow;
use crate::models::project::RoleSpec;
use crate::models::squad::{DraftAssignment, SquadDraft};

pub const MAX_PROPOSALS: usize = 3;

/// Harmony scores for heuristic proposals sit in a fixed 75-95 band so
/// downstream consumers can tell heuristic provenance from Oracle scores.
const HEURISTIC_SCORES: [u8; MAX_PROPOSALS] = [90, 85, 80];

/// Produces up to 3 structurally valid squad drafts from the pool.
pub fn propose(roles: &[RoleSpec], pool: &[CandidateRow]) -> Vec<SquadDraft> {
    let mut drafts = Vec::new();
    let mut next = 0usize; // cursor into the pool; candidates are used at most once overall

    for score in HEURISTIC_SCORES {
        if pool.len() - next < roles.len() {
            break;
        }

        let members = roles
            .iter()
            .map(|role| {
                let candidate = &pool[next];
                next += 1;
                DraftAssignment {
                    role_name: role.name.clone(),
                    candidate_id: candidate.id,
                    match_reason: match_reason(role, candidate),
                }
            })
            .collect();

        drafts.push(SquadDraft {
            members,
            harmony_score: score,
        });
    }

    drafts
}

fn match_reason(role: &RoleSpec, candidate: &CandidateRow) -> String {
    let overlap = candidate.skill_overlap(&role.required_skills);
    if overlap > 0 {
        format!(
            "Available {} candidate with {overlap} matching skill(s) for {}",
            candidate.experience_level, role.name
        )
    } else {
        format!(
            "Available {} candidate for {}",
            candidate.experience_level, role.name
        )
    }
}
