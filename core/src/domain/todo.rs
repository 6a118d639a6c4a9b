use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unit of self-reported work progress attached to an agent.
///
/// Todos live in an insertion-ordered list per agent; `id` is monotonic
/// within the agent (counter + timestamp, assigned by the service).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub text: String,
    pub status: TodoStatus,
    /// 1 = high, 2 = medium, 3 = low.
    pub priority: u8,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TodoItem {
    pub fn new(id: &str, text: &str, priority: u8) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            status: TodoStatus::Pending,
            priority,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Applies a status transition, stamping `completed_at` when the item
    /// enters `Completed`. Leaving `Completed` clears the stamp.
    pub fn set_status(&mut self, status: TodoStatus) {
        if status == TodoStatus::Completed && self.status != TodoStatus::Completed {
            self.completed_at = Some(Utc::now());
        } else if status != TodoStatus::Completed {
            self.completed_at = None;
        }
        self.status = status;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl TodoStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
        }
    }
}

pub const VALID_PRIORITIES: std::ops::RangeInclusive<u8> = 1..=3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_stamps_completed_at() {
        let mut todo = TodoItem::new("todo-1", "write tests", 1);
        assert!(todo.completed_at.is_none());

        todo.set_status(TodoStatus::InProgress);
        assert!(todo.completed_at.is_none());

        todo.set_status(TodoStatus::Completed);
        assert!(todo.completed_at.is_some());

        // Reopening clears the stamp.
        todo.set_status(TodoStatus::Pending);
        assert!(todo.completed_at.is_none());
    }

    #[test]
    fn status_round_trips_through_wire_names() {
        for status in [
            TodoStatus::Pending,
            TodoStatus::InProgress,
            TodoStatus::Completed,
            TodoStatus::Blocked,
        ] {
            assert_eq!(TodoStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TodoStatus::parse("done"), None);
    }

    #[test]
    fn pending_todo_omits_completed_at() {
        let todo = TodoItem::new("todo-1", "x", 2);
        let json = serde_json::to_value(&todo).unwrap();
        assert!(json.get("completed_at").is_none());
        assert_eq!(json["status"], "pending");
    }
}
