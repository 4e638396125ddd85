//! Squad proposals and the per-member consensus status model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Per-member invite decision state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Accepted,
    Rejected,
}

/// Squad-level status derived from member statuses. `PartialReject` is terminal:
/// a partially rejected squad is never auto-repaired, the recruiter re-invites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SquadStatus {
    Invited,
    Active,
    PartialReject,
}

impl SquadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SquadStatus::Invited => "invited",
            SquadStatus::Active => "active",
            SquadStatus::PartialReject => "partial_reject",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "invited" => Some(SquadStatus::Invited),
            "active" => Some(SquadStatus::Active),
            "partial_reject" => Some(SquadStatus::PartialReject),
            _ => None,
        }
    }
}

/// One role-to-candidate assignment within a persisted proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberAssignment {
    pub role_name: String,
    pub candidate_id: Uuid,
    pub match_reason: String,
    pub status: AssignmentStatus,
}

/// A not-yet-persisted assignment, as produced by the Oracle or the heuristic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftAssignment {
    pub role_name: String,
    pub candidate_id: Uuid,
    pub match_reason: String,
}

/// A squad proposal draft: output of matching, input to the invite step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquadDraft {
    pub members: Vec<DraftAssignment>,
    /// Advisory 0-100 compatibility estimate; heuristic drafts sit in 75-95.
    pub harmony_score: u8,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SquadProposalRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub members: Json<Vec<MemberAssignment>>,
    pub harmony_score: i32,
    pub status: String,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

/// Invite visibility record written for each member alongside the proposal.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct InviteRow {
    pub id: Uuid,
    pub proposal_id: Uuid,
    pub project_id: Uuid,
    pub candidate_id: Uuid,
    pub role_name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
