// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Advisory file locks and the recent-changes log (ADR-012).
//!
//! Locks are data, not enforcement: the broker records who intends to touch
//! which path and never inspects the filesystem. Acquisition is a
//! compare-and-set against the project's locks hash, so concurrent
//! announcements for the same path serialize in the store and exactly one
//! wins.

use serde_json::{json, Value};
use tracing::info;

use crate::domain::lock::{ChangeRecord, FileLock, LockAttempt};
use crate::domain::message::Envelope;
use crate::domain::store::keys;

use super::service::{CoordinationError, CoordinationService};

impl CoordinationService {
    pub async fn announce_file_change(
        &self,
        project_id: &str,
        session_name: &str,
        file_path: &str,
        change_type: &str,
        description: &str,
    ) -> Result<Value, CoordinationError> {
        let locks_key = keys::locks(project_id);
        let lock = FileLock::new(session_name, change_type, description);
        let payload = serde_json::to_string(&lock)?;

        let attempt = loop {
            if self
                .store
                .hash_set_nx(&locks_key, file_path, &payload)
                .await?
            {
                break LockAttempt::Acquired;
            }
            match self.store.hash_get(&locks_key, file_path).await? {
                // Released between the set-nx and the read; race again.
                None => continue,
                Some(raw) => {
                    let existing: FileLock = serde_json::from_str(&raw)?;
                    if existing.session_name == session_name {
                        // Re-entrant: refresh locked_at and the description.
                        self.store.hash_set(&locks_key, file_path, &payload).await?;
                        break LockAttempt::Refreshed;
                    }
                    break LockAttempt::Conflict(existing);
                }
            }
        };

        if let LockAttempt::Conflict(existing) = attempt {
            return Ok(json!({
                "status": "conflict",
                "error": format!("File is locked by {}", existing.session_name),
                "lock_info": existing,
                "suggestion": "Query that agent about their progress or wait for the lock to be released",
            }));
        }

        self.record_change(
            project_id,
            &ChangeRecord::file_change(session_name, file_path, change_type, description),
        )
        .await?;
        self.fan_out(
            project_id,
            &Envelope::broadcast(
                session_name,
                "file_change_announced",
                format!("{session_name} will {change_type} {file_path}: {description}"),
            ),
            Some(session_name),
        )
        .await?;
        self.touch_heartbeat(project_id, session_name).await?;

        info!(%project_id, %session_name, %file_path, "file lock acquired");

        Ok(json!({
            "status": "locked",
            "file_path": file_path,
            "message": "File locked successfully. Remember to release when done.",
        }))
    }

    /// Deletes the lock only when the requester owns it. Releasing an
    /// unheld path is a no-op success; releasing someone else's lock never
    /// mutates state.
    pub async fn release_file_lock(
        &self,
        project_id: &str,
        session_name: &str,
        file_path: &str,
    ) -> Result<Value, CoordinationError> {
        let locks_key = keys::locks(project_id);
        let Some(raw) = self.store.hash_get(&locks_key, file_path).await? else {
            return Ok(json!({
                "status": "released",
                "file_path": file_path,
                "message": "File was not locked.",
            }));
        };

        let lock: FileLock = serde_json::from_str(&raw)?;
        if lock.session_name != session_name {
            return Ok(json!({
                "status": "error",
                "error": format!(
                    "File is locked by {}, not {session_name}",
                    lock.session_name
                ),
            }));
        }

        self.store.hash_del(&locks_key, file_path).await?;
        self.fan_out(
            project_id,
            &Envelope::broadcast(
                session_name,
                "file_lock_released",
                format!("{session_name} released the lock on {file_path}"),
            ),
            Some(session_name),
        )
        .await?;
        self.touch_heartbeat(project_id, session_name).await?;

        info!(%project_id, %session_name, %file_path, "file lock released");

        Ok(json!({
            "status": "released",
            "file_path": file_path,
            "message": "Lock released.",
        }))
    }

    /// Up to `limit` most recent change entries, newest first.
    pub async fn get_recent_changes(
        &self,
        project_id: &str,
        limit: i64,
    ) -> Result<Value, CoordinationError> {
        let limit = limit.clamp(0, self.config.recent_changes_cap as i64);
        if limit == 0 {
            return Ok(json!([]));
        }
        let raw = self
            .store
            .list_range(&keys::recent_changes(project_id), 0, limit - 1)
            .await?;
        let changes: Vec<Value> = raw
            .iter()
            .filter_map(|entry| serde_json::from_str(entry).ok())
            .collect();
        Ok(Value::Array(changes))
    }
}
