//! `TeamTask` data model and patch-based update semantics (spec section 3).

use crate::phase::Phase;
use crate::utils::validation::{validate_task_id, ValidationError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamTask {
    pub id: String,
    pub subject: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, rename = "blockedBy")]
    pub blocked_by: Vec<String>,
    #[serde(default)]
    pub blocks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(default, rename = "activeForm", skip_serializing_if = "Option::is_none")]
    pub active_form: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl TeamTask {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_task_id(&self.id)
    }
}

/// Partial update applied by `updateTask`; every `Some` field overwrites
/// the corresponding task field, `None` leaves it untouched. `updatedAt`
/// is always rewritten to `now()` by the store regardless of what else
/// changed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    pub subject: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub owner: Option<String>,
    #[serde(rename = "blockedBy")]
    pub blocked_by: Option<Vec<String>>,
    pub blocks: Option<Vec<String>>,
    pub phase: Option<Phase>,
    #[serde(rename = "activeForm")]
    pub active_form: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl TaskPatch {
    pub fn apply(self, task: &mut TeamTask) {
        if let Some(v) = self.subject {
            task.subject = v;
        }
        if let Some(v) = self.description {
            task.description = v;
        }
        if let Some(v) = self.status {
            task.status = v;
        }
        if let Some(v) = self.priority {
            task.priority = v;
        }
        if let Some(v) = self.owner {
            task.owner = Some(v);
        }
        if let Some(v) = self.blocked_by {
            task.blocked_by = v;
        }
        if let Some(v) = self.blocks {
            task.blocks = v;
        }
        if let Some(v) = self.phase {
            task.phase = Some(v);
        }
        if let Some(v) = self.active_form {
            task.active_form = Some(v);
        }
        if let Some(v) = self.metadata {
            task.metadata = Some(v);
        }
    }
}

/// Verifies every `blockedBy`/`blocks` id in `tasks` references an existing
/// task id within the same team, returning the first dangling reference.
pub fn find_dangling_reference(tasks: &[TeamTask]) -> Option<ValidationError> {
    let ids: std::collections::HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    for task in tasks {
        for to in task.blocked_by.iter().chain(task.blocks.iter()) {
            if !ids.contains(to.as_str()) {
                return Some(ValidationError::DanglingTaskReference {
                    from: task.id.clone(),
                    to: to.clone(),
                });
            }
        }
    }
    None
}
