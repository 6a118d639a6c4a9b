use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An advisory file lock: a declared intent to modify a path, honored by
/// convention. The broker never touches the filesystem it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileLock {
    pub session_name: String,
    pub locked_at: DateTime<Utc>,
    pub change_type: String,
    pub description: String,
}

impl FileLock {
    pub fn new(session_name: &str, change_type: &str, description: &str) -> Self {
        Self {
            session_name: session_name.to_string(),
            locked_at: Utc::now(),
            change_type: change_type.to_string(),
            description: description.to_string(),
        }
    }
}

/// Outcome of a compare-and-set lock acquisition.
#[derive(Debug, Clone)]
pub enum LockAttempt {
    /// The path was free and is now held by the caller.
    Acquired,
    /// The caller already held the path; `locked_at` and description were
    /// refreshed.
    Refreshed,
    /// Another session holds the path. State was not modified.
    Conflict(FileLock),
}

/// One entry in the project's bounded recent-changes log.
///
/// `file_path` is absent on broker-originated entries (reap notices).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub session_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub change_type: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl ChangeRecord {
    pub fn file_change(
        session_name: &str,
        file_path: &str,
        change_type: &str,
        description: &str,
    ) -> Self {
        Self {
            session_name: session_name.to_string(),
            file_path: Some(file_path.to_string()),
            change_type: change_type.to_string(),
            description: description.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn system(description: String) -> Self {
        Self {
            session_name: "system".to_string(),
            file_path: None,
            change_type: "system".to_string(),
            description,
            timestamp: Utc::now(),
        }
    }
}
