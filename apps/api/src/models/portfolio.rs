use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Portable, anonymized proof-of-work record. The (candidate_id, project_id)
/// primary key doubles as the idempotency key: at most one row per pair, ever,
/// immutable after Oracle enrichment.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PortfolioRow {
    pub candidate_id: Uuid,
    pub project_id: Uuid,
    pub abstract_text: String,
    pub breakdown: String,
    pub skill_tags: Vec<String>,
    pub source_score: i32,
    pub verified_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
