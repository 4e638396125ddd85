use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::milestones::tracker::{
    get_progress, review_task, submit_task, ProgressReport, ReviewDecision,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub note: Option<String>,
}

/// POST /api/v1/engagements/:project_id/:candidate_id/tasks/:index/submit
pub async fn handle_submit_task(
    State(state): State<AppState>,
    Path((project_id, candidate_id, index)): Path<(Uuid, Uuid, u32)>,
    Json(req): Json<SubmitRequest>,
) -> Result<StatusCode, AppError> {
    submit_task(&state.db, project_id, candidate_id, index, req.note).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    pub feedback: Option<String>,
}

/// POST /api/v1/engagements/:project_id/:candidate_id/tasks/:index/review
///
/// Always succeeds or fails atomically; completion synthesis runs detached and
/// cannot affect this response.
pub async fn handle_review_task(
    State(state): State<AppState>,
    Path((project_id, candidate_id, index)): Path<(Uuid, Uuid, u32)>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<ProgressReport>, AppError> {
    let report = review_task(
        &state,
        project_id,
        candidate_id,
        index,
        req.decision,
        req.feedback,
    )
    .await?;
    Ok(Json(report))
}

/// GET /api/v1/engagements/:project_id/:candidate_id/progress
pub async fn handle_get_progress(
    State(state): State<AppState>,
    Path((project_id, candidate_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ProgressReport>, AppError> {
    let report = get_progress(&state.db, project_id, candidate_id).await?;
    Ok(Json(report))
}
