use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::todo::{TodoItem, TodoStatus};

/// A registered participant in a project.
///
/// Keyed by `session_name` in the project's agent registry; the record
/// itself does not repeat the session name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub task_id: String,
    pub branch: String,
    pub description: String,
    pub status: AgentStatus,
    pub started_at: DateTime<Utc>,
    pub project_id: String,
}

impl AgentRecord {
    pub fn new(project_id: &str, task_id: &str, branch: &str, description: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            branch: branch.to_string(),
            description: description.to_string(),
            status: AgentStatus::Active,
            started_at: Utc::now(),
            project_id: project_id.to_string(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Completed,
}

/// Durable record written by `mark_task_completed`. Outlives the agent's
/// registration; orchestrators poll these to decide when a session can be
/// torn down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub task_id: String,
    pub session_name: String,
    pub completed_at: DateTime<Utc>,
}

/// Final todo counters reported on unregistration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoSummary {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub in_progress: usize,
}

impl TodoSummary {
    pub fn tally(todos: &[TodoItem]) -> Self {
        let mut summary = Self {
            total: todos.len(),
            ..Self::default()
        };
        for todo in todos {
            match todo.status {
                TodoStatus::Completed => summary.completed += 1,
                TodoStatus::Pending => summary.pending += 1,
                TodoStatus::InProgress => summary.in_progress += 1,
                TodoStatus::Blocked => {}
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::todo::TodoItem;

    #[test]
    fn summary_counts_by_status() {
        let mut todos = vec![
            TodoItem::new("todo-1", "a", 1),
            TodoItem::new("todo-2", "b", 2),
            TodoItem::new("todo-3", "c", 3),
            TodoItem::new("todo-4", "d", 1),
        ];
        todos[0].set_status(TodoStatus::Completed);
        todos[1].set_status(TodoStatus::InProgress);
        todos[2].set_status(TodoStatus::Blocked);

        let summary = TodoSummary::tally(&todos);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.in_progress, 1);
        assert_eq!(summary.pending, 1);
    }

    #[test]
    fn status_serializes_lowercase() {
        let record = AgentRecord::new("p", "001", "feat/x", "demo");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "active");
    }
}
