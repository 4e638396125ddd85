//! Engagements: one candidate's attachment to one project, keyed
//! (project_id, candidate_id), carrying the per-task progress map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Lifecycle status of an engagement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementStatus {
    Applied,
    Shortlisted,
    Hired,
    WorkSubmitted,
    Completed,
    Rejected,
}

impl EngagementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementStatus::Applied => "applied",
            EngagementStatus::Shortlisted => "shortlisted",
            EngagementStatus::Hired => "hired",
            EngagementStatus::WorkSubmitted => "work_submitted",
            EngagementStatus::Completed => "completed",
            EngagementStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "applied" => Some(EngagementStatus::Applied),
            "shortlisted" => Some(EngagementStatus::Shortlisted),
            "hired" => Some(EngagementStatus::Hired),
            "work_submitted" => Some(EngagementStatus::WorkSubmitted),
            "completed" => Some(EngagementStatus::Completed),
            "rejected" => Some(EngagementStatus::Rejected),
            _ => None,
        }
    }
}

/// Per-task review state. `verified` is the single terminal literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    NotStarted,
    Submitted,
    Verified,
    ChangesRequested,
}

/// State of one task for one engaged candidate, keyed by global task index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub status: TaskStatus,
    pub submission_note: Option<String>,
    pub feedback: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl TaskState {
    pub fn not_started(now: DateTime<Utc>) -> Self {
        TaskState {
            status: TaskStatus::NotStarted,
            submission_note: None,
            feedback: None,
            updated_at: now,
        }
    }
}

/// The progress map: global task index → task state. Integer keys serialize as
/// JSON object keys ("0", "1", ...).
pub type TaskProgress = BTreeMap<u32, TaskState>;

/// Fresh progress map covering every global index of a job.
pub fn initial_task_progress(total_tasks: u32, now: DateTime<Utc>) -> TaskProgress {
    (0..total_tasks)
        .map(|i| (i, TaskState::not_started(now)))
        .collect()
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EngagementRow {
    pub project_id: Uuid,
    pub candidate_id: Uuid,
    pub status: String,
    pub task_progress: Json<TaskProgress>,
    pub version: i32,
    pub hired_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub withdrawn_at: Option<DateTime<Utc>>,
}

impl EngagementRow {
    pub fn status_enum(&self) -> Option<EngagementStatus> {
        EngagementStatus::parse(&self.status)
    }
}
