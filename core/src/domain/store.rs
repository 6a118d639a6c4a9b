// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Storage port (ADR-007).
//!
//! The engine persists exclusively through the [`Store`] trait: atomic hash,
//! list and string operations over a flat keyspace, plus prefix scans and
//! TTLs. Backends live in `infrastructure::store` - in-memory for tests and
//! development, Redis for production - mirroring the in-memory/production
//! repository split used elsewhere in the platform.
//!
//! Handlers that touch more than one key funnel their writes through
//! [`Store::apply`], which backends execute as a single atomic group so
//! concurrent readers never observe a partially written agent.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transient backend failure. Backends retry internally before
    /// surfacing this; callers map it to `status: "store_unavailable"`.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One write inside an atomic [`Store::apply`] group.
#[derive(Debug, Clone)]
pub enum WriteOp {
    HashSet {
        key: String,
        field: String,
        value: String,
    },
    HashDel {
        key: String,
        field: String,
    },
    ListPushBack {
        key: String,
        value: String,
    },
    SetExpiring {
        key: String,
        value: String,
        ttl: Duration,
    },
    Delete {
        key: String,
    },
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>>;
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;
    /// Sets the field only when absent; returns whether the write happened.
    /// This is the compare-and-set primitive behind lock acquisition.
    async fn hash_set_nx(&self, key: &str, field: &str, value: &str) -> StoreResult<bool>;
    async fn hash_del(&self, key: &str, field: &str) -> StoreResult<bool>;
    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>>;
    async fn hash_keys(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn list_push_back(&self, key: &str, value: &str) -> StoreResult<()>;
    /// Bounded queue push. Beyond `cap` entries the oldest are dropped and a
    /// single `sentinel` entry occupies the head; repeated overflows reuse
    /// the existing sentinel. Returns whether anything was dropped.
    async fn list_push_capped(
        &self,
        key: &str,
        value: &str,
        cap: usize,
        sentinel: &str,
    ) -> StoreResult<bool>;
    /// Prepends and trims to `cap` entries (newest-first logs).
    async fn list_push_front_trimmed(&self, key: &str, value: &str, cap: usize)
        -> StoreResult<()>;
    async fn list_range(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>>;
    /// Atomic read-and-clear: two concurrent takers get disjoint slices.
    async fn list_take(&self, key: &str) -> StoreResult<Vec<String>>;
    /// Removes the first entry exactly equal to `value`.
    async fn list_remove(&self, key: &str, value: &str) -> StoreResult<bool>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;
    async fn set_expiring(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;
    async fn delete(&self, key: &str) -> StoreResult<()>;
    /// Glob-style key scan; `*` matches any run of characters.
    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Applies the batch as one atomic group.
    async fn apply(&self, ops: Vec<WriteOp>) -> StoreResult<()>;
}

/// Namespaced key construction: `project:{project_id}:{resource}[:{id}]`.
/// Keys in different projects never alias.
pub mod keys {
    pub fn agents(project_id: &str) -> String {
        format!("project:{project_id}:agents")
    }

    pub fn heartbeat(project_id: &str, session_name: &str) -> String {
        format!("project:{project_id}:heartbeat:{session_name}")
    }

    pub fn todos(project_id: &str, session_name: &str) -> String {
        format!("project:{project_id}:todos:{session_name}")
    }

    pub fn messages(project_id: &str, session_name: &str) -> String {
        format!("project:{project_id}:messages:{session_name}")
    }

    pub fn locks(project_id: &str) -> String {
        format!("project:{project_id}:locks")
    }

    pub fn interfaces(project_id: &str) -> String {
        format!("project:{project_id}:interfaces")
    }

    pub fn recent_changes(project_id: &str) -> String {
        format!("project:{project_id}:recent_changes")
    }

    pub fn completed(project_id: &str, task_id: &str) -> String {
        format!("project:{project_id}:completed:{task_id}")
    }

    pub fn pending(project_id: &str, message_id: &str) -> String {
        format!("project:{project_id}:pending:{message_id}")
    }

    pub fn all_agents_pattern() -> &'static str {
        "project:*:agents"
    }

    pub fn pending_pattern(project_id: &str) -> String {
        format!("project:{project_id}:pending:*")
    }

    /// Extracts the project id from a `project:{id}:{resource}` key.
    pub fn project_of(key: &str) -> Option<&str> {
        let rest = key.strip_prefix("project:")?;
        let end = rest.rfind(':')?;
        Some(&rest[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::keys;

    #[test]
    fn keys_are_project_scoped() {
        assert_eq!(keys::agents("p1"), "project:p1:agents");
        assert_eq!(keys::heartbeat("p1", "task-001"), "project:p1:heartbeat:task-001");
        assert_eq!(keys::completed("p1", "42"), "project:p1:completed:42");
        assert_ne!(keys::todos("a", "s"), keys::todos("b", "s"));
    }

    #[test]
    fn project_of_round_trips() {
        assert_eq!(keys::project_of(&keys::agents("demo")), Some("demo"));
        assert_eq!(keys::project_of("project:a:b:agents"), Some("a:b"));
        assert_eq!(keys::project_of("unrelated"), None);
    }
}
