use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::consensus::invites::{invite_squad, list_invites, respond_to_invite};
use crate::errors::AppError;
use crate::models::squad::{AssignmentStatus, InviteRow, SquadDraft, SquadStatus};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub project_id: Uuid,
    pub proposal: SquadDraft,
}

#[derive(Debug, Serialize)]
pub struct InviteResponse {
    pub proposal_id: Uuid,
}

/// POST /api/v1/squads/invite
pub async fn handle_invite_squad(
    State(state): State<AppState>,
    Json(req): Json<InviteRequest>,
) -> Result<Json<InviteResponse>, AppError> {
    let proposal_id = invite_squad(&state.db, req.project_id, &req.proposal).await?;
    Ok(Json(InviteResponse { proposal_id }))
}

/// A member's decision on an invite. Maps onto the non-pending assignment
/// statuses.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteDecision {
    Accepted,
    Rejected,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub candidate_id: Uuid,
    pub decision: InviteDecision,
}

#[derive(Debug, Serialize)]
pub struct RespondResponse {
    pub squad_status: SquadStatus,
}

/// POST /api/v1/squads/:id/respond
pub async fn handle_respond_to_invite(
    State(state): State<AppState>,
    Path(proposal_id): Path<Uuid>,
    Json(req): Json<RespondRequest>,
) -> Result<Json<RespondResponse>, AppError> {
    let decision = match req.decision {
        InviteDecision::Accepted => AssignmentStatus::Accepted,
        InviteDecision::Rejected => AssignmentStatus::Rejected,
    };
    let squad_status =
        respond_to_invite(&state.db, proposal_id, req.candidate_id, decision).await?;
    Ok(Json(RespondResponse { squad_status }))
}

#[derive(Debug, Deserialize)]
pub struct CandidateIdQuery {
    pub candidate_id: Uuid,
}

/// GET /api/v1/invites?candidate_id=
pub async fn handle_list_invites(
    State(state): State<AppState>,
    Query(params): Query<CandidateIdQuery>,
) -> Result<Json<Vec<InviteRow>>, AppError> {
    let invites = list_invites(&state.db, params.candidate_id).await?;
    Ok(Json(invites))
}
