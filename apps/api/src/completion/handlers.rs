use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::portfolio::PortfolioRow;
use crate::state::AppState;

/// GET /api/v1/portfolio/:candidate_id
///
/// A candidate's proof-of-work records, newest first.
pub async fn handle_get_portfolio(
    State(state): State<AppState>,
    Path(candidate_id): Path<Uuid>,
) -> Result<Json<Vec<PortfolioRow>>, AppError> {
    let entries: Vec<PortfolioRow> = sqlx::query_as(
        "SELECT * FROM portfolio_entries WHERE candidate_id = $1 ORDER BY created_at DESC",
    )
    .bind(candidate_id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(entries))
}
