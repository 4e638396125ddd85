use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Candidate profile row — read-only input to matching, owned by the external
/// profile subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CandidateRow {
    pub id: Uuid,
    pub name: String,
    pub skills: Vec<String>,
    pub experience_level: String,
    pub summary: String,
    pub work_history: serde_json::Value,
}

impl CandidateRow {
    /// Count of skills overlapping a role's required tags (case-insensitive).
    pub fn skill_overlap(&self, required: &[String]) -> usize {
        required
            .iter()
            .filter(|r| {
                self.skills
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(r.as_str()))
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(skills: &[&str]) -> CandidateRow {
        CandidateRow {
            id: Uuid::new_v4(),
            name: "Test Candidate".to_string(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            experience_level: "mid".to_string(),
            summary: String::new(),
            work_history: json!([]),
        }
    }

    #[test]
    fn test_skill_overlap_is_case_insensitive() {
        let c = candidate(&["Rust", "postgres"]);
        let required = vec!["rust".to_string(), "Postgres".to_string(), "go".to_string()];
        assert_eq!(c.skill_overlap(&required), 2);
    }

    #[test]
    fn test_skill_overlap_empty_requirements() {
        let c = candidate(&["rust"]);
        assert_eq!(c.skill_overlap(&[]), 0);
    }
}
