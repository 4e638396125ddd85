//! Project documents: roles, modules, tasks, and the global task index math.
//!
//! A job's tasks are flattened across modules in declaration order; the resulting
//! global index is fixed at post time and keys every engagement's progress map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::ops::Range;
use uuid::Uuid;

/// One role slot on a collaborative project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleSpec {
    pub name: String,
    pub description: String,
    pub required_skills: Vec<String>,
}

/// A single deliverable within a module. Payout is in cents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub description: String,
    pub payout: i64,
}

/// An ordered grouping of tasks with its own deadline; the unit of candidate
/// replacement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub tasks: Vec<TaskSpec>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProjectRow {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub collaborative: bool,
    pub roles: Json<Vec<RoleSpec>>,
    pub modules: Json<Vec<ModuleSpec>>,
    pub created_at: DateTime<Utc>,
}

impl ProjectRow {
    pub fn total_task_count(&self) -> u32 {
        total_task_count(&self.modules)
    }

    pub fn module_task_range(&self, module_id: Uuid) -> Option<Range<u32>> {
        module_task_range(&self.modules, module_id)
    }

    pub fn module_for_index(&self, global_index: u32) -> Option<&ModuleSpec> {
        module_for_index(&self.modules, global_index)
    }
}

/// Total number of tasks across all modules — fixed at post time.
pub fn total_task_count(modules: &[ModuleSpec]) -> u32 {
    modules.iter().map(|m| m.tasks.len() as u32).sum()
}

/// Half-open global-index range covered by the given module, in declaration order.
pub fn module_task_range(modules: &[ModuleSpec], module_id: Uuid) -> Option<Range<u32>> {
    let mut start = 0u32;
    for module in modules {
        let len = module.tasks.len() as u32;
        if module.id == module_id {
            return Some(start..start + len);
        }
        start += len;
    }
    None
}

/// The module owning a given global task index.
pub fn module_for_index(modules: &[ModuleSpec], global_index: u32) -> Option<&ModuleSpec> {
    let mut start = 0u32;
    for module in modules {
        let end = start + module.tasks.len() as u32;
        if global_index < end {
            return Some(module);
        }
        start = end;
    }
    None
}

/// Sum of task payouts for a module, in cents.
pub fn module_payout_sum(module: &ModuleSpec) -> i64 {
    module.tasks.iter().map(|t| t.payout).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(id: Uuid, task_count: usize) -> ModuleSpec {
        ModuleSpec {
            id,
            title: format!("Module {id}"),
            description: "test module".to_string(),
            deadline: Utc::now(),
            tasks: (0..task_count)
                .map(|i| TaskSpec {
                    description: format!("task {i}"),
                    payout: 1000,
                })
                .collect(),
        }
    }

    #[test]
    fn test_total_task_count_sums_modules() {
        let modules = vec![module(Uuid::new_v4(), 3), module(Uuid::new_v4(), 2)];
        assert_eq!(total_task_count(&modules), 5);
    }

    #[test]
    fn test_module_task_range_is_contiguous_in_declaration_order() {
        let m1 = Uuid::new_v4();
        let m2 = Uuid::new_v4();
        let modules = vec![module(m1, 3), module(m2, 2)];
        assert_eq!(module_task_range(&modules, m1), Some(0..3));
        assert_eq!(module_task_range(&modules, m2), Some(3..5));
    }

    #[test]
    fn test_module_task_range_unknown_module_is_none() {
        let modules = vec![module(Uuid::new_v4(), 3)];
        assert_eq!(module_task_range(&modules, Uuid::new_v4()), None);
    }

    #[test]
    fn test_module_for_index_finds_owning_module() {
        let m1 = Uuid::new_v4();
        let m2 = Uuid::new_v4();
        let modules = vec![module(m1, 3), module(m2, 2)];
        assert_eq!(module_for_index(&modules, 0).map(|m| m.id), Some(m1));
        assert_eq!(module_for_index(&modules, 2).map(|m| m.id), Some(m1));
        assert_eq!(module_for_index(&modules, 3).map(|m| m.id), Some(m2));
        assert_eq!(module_for_index(&modules, 4).map(|m| m.id), Some(m2));
        assert!(module_for_index(&modules, 5).is_none());
    }

    #[test]
    fn test_module_payout_sum() {
        let m = module(Uuid::new_v4(), 4);
        assert_eq!(module_payout_sum(&m), 4000);
    }

    #[test]
    fn test_empty_module_has_empty_range() {
        let m1 = Uuid::new_v4();
        let m2 = Uuid::new_v4();
        let modules = vec![module(m1, 0), module(m2, 2)];
        assert_eq!(module_task_range(&modules, m1), Some(0..0));
        assert_eq!(module_task_range(&modules, m2), Some(0..2));
    }
}
