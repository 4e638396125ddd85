use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::candidate::CandidateRow;
use crate::reassignment::switcher::{eligible_replacements, switch_candidate};
use crate::state::AppState;

/// GET /api/v1/projects/:id/modules/:module_id/replacements
pub async fn handle_list_replacements(
    State(state): State<AppState>,
    Path((project_id, _module_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<CandidateRow>>, AppError> {
    let candidates = eligible_replacements(&state.db, project_id).await?;
    Ok(Json(candidates))
}

#[derive(Debug, Deserialize)]
pub struct SwitchRequest {
    pub old_candidate_id: Uuid,
    pub new_candidate_id: Uuid,
}

/// POST /api/v1/projects/:id/modules/:module_id/switch
pub async fn handle_switch_candidate(
    State(state): State<AppState>,
    Path((project_id, module_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<SwitchRequest>,
) -> Result<StatusCode, AppError> {
    switch_candidate(
        &state.db,
        project_id,
        module_id,
        req.old_candidate_id,
        req.new_candidate_id,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
