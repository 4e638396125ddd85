//! Candidate Pool Accessor — "strict filter, then relax" query strategy.
//!
//! Strict pass: candidates whose skills overlap the union of role skill tags.
//! If the strict set is thin, a relaxed unfiltered pass tops it up; the merge
//! de-duplicates by id and preserves strict-result ordering first.

use anyhow::Result;
use sqlx::PgPool;
use tracing::debug;

use crate::models::candidate::CandidateRow;
use crate::models::project::RoleSpec;

/// Upper bound on candidates fetched per pass; keeps Oracle briefs bounded.
pub const POOL_CAP: i64 = 20;
/// Below this strict-result size the relaxed re-query kicks in.
pub const MIN_STRICT_POOL: usize = 8;

/// Fetches the candidate pool for a role set.
pub async fn fetch_pool(db: &PgPool, roles: &[RoleSpec]) -> Result<Vec<CandidateRow>> {
    let tags: Vec<String> = roles
        .iter()
        .flat_map(|r| r.required_skills.iter().cloned())
        .collect();

    let strict: Vec<CandidateRow> = sqlx::query_as(
        "SELECT * FROM candidates WHERE skills && $1 ORDER BY id LIMIT $2",
    )
    .bind(&tags)
    .bind(POOL_CAP)
    .fetch_all(db)
    .await?;

    if strict.len() >= MIN_STRICT_POOL {
        return Ok(strict);
    }

    debug!(
        "Strict pool too small ({} < {MIN_STRICT_POOL}), relaxing filters",
        strict.len()
    );

    let relaxed: Vec<CandidateRow> =
        sqlx::query_as("SELECT * FROM candidates ORDER BY id LIMIT $1")
            .bind(POOL_CAP)
            .fetch_all(db)
            .await?;

    Ok(merge_pools(strict, relaxed))
}

/// Merges the relaxed pass into the strict pass, de-duplicating by candidate id
/// and excluding anyone already pool-listed. Strict candidates keep priority.
pub fn merge_pools(strict: Vec<CandidateRow>, relaxed: Vec<CandidateRow>) -> Vec<CandidateRow> {
    let mut merged = strict;
    for candidate in relaxed {
        if !merged.iter().any(|c| c.id == candidate.id) {
            merged.push(candidate);
        }
        if merged.len() as i64 >= POOL_CAP {
            break;
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn candidate(id: Uuid) -> CandidateRow {
        CandidateRow {
            id,
            name: "c".to_string(),
            skills: vec!["rust".to_string()],
            experience_level: "mid".to_string(),
            summary: String::new(),
            work_history: json!([]),
        }
    }

    #[test]
    fn test_merge_pools_dedupes_by_id() {
        let shared = Uuid::new_v4();
        let strict = vec![candidate(shared), candidate(Uuid::new_v4())];
        let relaxed = vec![candidate(shared), candidate(Uuid::new_v4())];

        let merged = merge_pools(strict, relaxed);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.iter().filter(|c| c.id == shared).count(), 1);
    }

    #[test]
    fn test_merge_pools_keeps_strict_ordering_first() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let merged = merge_pools(vec![candidate(a)], vec![candidate(b)]);
        assert_eq!(merged[0].id, a);
        assert_eq!(merged[1].id, b);
    }

    #[test]
    fn test_merge_pools_respects_cap() {
        let strict: Vec<_> = (0..POOL_CAP as usize).map(|_| candidate(Uuid::new_v4())).collect();
        let relaxed = vec![candidate(Uuid::new_v4())];
        let merged = merge_pools(strict, relaxed);
        assert_eq!(merged.len() as i64, POOL_CAP);
    }
}
