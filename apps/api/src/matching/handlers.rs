use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::errors::AppError;
use crate::matching::matcher::{match_squads, MatchOutcome};
use crate::state::AppState;

/// POST /api/v1/projects/:id/squads/match
///
/// Read-only: returns draft proposals without persisting anything. An empty
/// list with a reason is a normal outcome, not an error.
pub async fn handle_match_squads(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<MatchOutcome>, AppError> {
    let outcome = match_squads(&state.db, &state.oracle, project_id).await?;
    Ok(Json(outcome))
}
