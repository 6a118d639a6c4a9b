// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Coordination service context.
//!
//! One `CoordinationService` is created at startup and shared (via `Arc`)
//! between the tool dispatcher and the liveness monitor. Handlers are
//! stateless transformations over the store; the only in-process state is
//! the pending-query table and the todo id sequence, both of which are
//! purely accelerators over what the store already holds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::domain::agent::AgentRecord;
use crate::domain::config::BrokerConfig;
use crate::domain::lock::{ChangeRecord, FileLock};
use crate::domain::message::Envelope;
use crate::domain::store::{keys, Store, StoreError, WriteOp};
use crate::domain::todo::TodoItem;

use super::pending::PendingQueries;

#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    /// The backend stayed unreachable through the store's own retries.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for CoordinationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => Self::StoreUnavailable(msg),
            StoreError::Serialization(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoordinationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

pub struct CoordinationService {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) config: BrokerConfig,
    pub(crate) pending: PendingQueries,
    todo_seq: AtomicU64,
}

impl CoordinationService {
    pub fn new(store: Arc<dyn Store>, config: BrokerConfig) -> Self {
        Self {
            store,
            config,
            pending: PendingQueries::new(),
            todo_seq: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Refreshes the agent's heartbeat TTL. Called by `heartbeat` itself and
    /// as a side effect of every state-mutating tool, so live agents stay
    /// alive even under burst activity that skips explicit heartbeats.
    pub(crate) async fn touch_heartbeat(
        &self,
        project_id: &str,
        session_name: &str,
    ) -> Result<(), CoordinationError> {
        self.store
            .set_expiring(
                &keys::heartbeat(project_id, session_name),
                &Utc::now().to_rfc3339(),
                self.config.heartbeat_timeout,
            )
            .await?;
        Ok(())
    }

    pub(crate) async fn load_agent(
        &self,
        project_id: &str,
        session_name: &str,
    ) -> Result<Option<AgentRecord>, CoordinationError> {
        let raw = self
            .store
            .hash_get(&keys::agents(project_id), session_name)
            .await?;
        match raw {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(record) => Ok(Some(record)),
                Err(err) => {
                    warn!(%project_id, %session_name, error = %err, "corrupt agent record");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub(crate) async fn load_todos(
        &self,
        project_id: &str,
        session_name: &str,
    ) -> Result<Vec<TodoItem>, CoordinationError> {
        let raw = self
            .store
            .list_range(&keys::todos(project_id, session_name), 0, -1)
            .await?;
        Ok(raw
            .iter()
            .filter_map(|item| serde_json::from_str(item).ok())
            .collect())
    }

    /// Sessions currently in the active set, sorted for deterministic
    /// output.
    pub(crate) async fn active_sessions(
        &self,
        project_id: &str,
    ) -> Result<Vec<String>, CoordinationError> {
        let agents = self.store.hash_get_all(&keys::agents(project_id)).await?;
        let mut sessions: Vec<String> = agents
            .into_iter()
            .filter_map(|(session, raw)| {
                serde_json::from_str::<AgentRecord>(&raw)
                    .ok()
                    .filter(AgentRecord::is_active)
                    .map(|_| session)
            })
            .collect();
        sessions.sort();
        Ok(sessions)
    }

    /// Enqueues `envelope` into every other active agent's queue. Only
    /// agents in the active set at this moment receive it; agents joining
    /// later do not. Queues are bounded: overflow drops the oldest entry and
    /// leaves a single sentinel at the head.
    pub(crate) async fn fan_out(
        &self,
        project_id: &str,
        envelope: &Envelope,
        exclude: Option<&str>,
    ) -> Result<usize, CoordinationError> {
        let payload = serde_json::to_string(envelope)?;
        let sentinel = Envelope::overflow_sentinel_json();
        let mut recipients = 0;
        for session in self.active_sessions(project_id).await? {
            if exclude == Some(session.as_str()) {
                continue;
            }
            self.store
                .list_push_capped(
                    &keys::messages(project_id, &session),
                    &payload,
                    self.config.max_queue_len,
                    &sentinel,
                )
                .await?;
            recipients += 1;
        }
        Ok(recipients)
    }

    /// Appends to the project's bounded recent-changes log, newest first.
    pub(crate) async fn record_change(
        &self,
        project_id: &str,
        record: &ChangeRecord,
    ) -> Result<(), CoordinationError> {
        self.store
            .list_push_front_trimmed(
                &keys::recent_changes(project_id),
                &serde_json::to_string(record)?,
                self.config.recent_changes_cap,
            )
            .await?;
        Ok(())
    }

    /// Removes every trace of an agent in one atomic group: held locks,
    /// heartbeat, message queue, todo list and the registry entry. Used by
    /// both `unregister_agent` and the liveness monitor; whichever runs
    /// second observes empty state and is a no-op. Returns the released lock
    /// paths.
    pub(crate) async fn purge_agent(
        &self,
        project_id: &str,
        session_name: &str,
    ) -> Result<Vec<String>, CoordinationError> {
        let locks_key = keys::locks(project_id);
        let locks = self.store.hash_get_all(&locks_key).await?;
        let mut ops = Vec::new();
        let mut released = Vec::new();
        for (file_path, raw) in locks {
            let owned = serde_json::from_str::<FileLock>(&raw)
                .map(|lock| lock.session_name == session_name)
                .unwrap_or(false);
            if owned {
                ops.push(WriteOp::HashDel {
                    key: locks_key.clone(),
                    field: file_path.clone(),
                });
                released.push(file_path);
            }
        }
        ops.push(WriteOp::Delete {
            key: keys::heartbeat(project_id, session_name),
        });
        ops.push(WriteOp::Delete {
            key: keys::messages(project_id, session_name),
        });
        ops.push(WriteOp::Delete {
            key: keys::todos(project_id, session_name),
        });
        ops.push(WriteOp::HashDel {
            key: keys::agents(project_id),
            field: session_name.to_string(),
        });
        self.store.apply(ops).await?;
        released.sort();
        Ok(released)
    }

    pub(crate) fn next_todo_id(&self) -> String {
        let seq = self.todo_seq.fetch_add(1, Ordering::Relaxed);
        format!("todo-{}-{seq}", Utc::now().timestamp_millis())
    }
}
