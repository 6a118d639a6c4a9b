// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent registration lifecycle: register, heartbeat, list, unregister and
//! task completion.

use std::path::Path;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::domain::agent::{AgentRecord, AgentStatus, CompletionRecord, TodoSummary};
use crate::domain::message::Envelope;
use crate::domain::store::{keys, WriteOp};

use super::service::{CoordinationError, CoordinationService};

impl CoordinationService {
    /// Registers an agent for a project.
    ///
    /// A `session_name` that is already active for a *different* task is
    /// rejected; re-registering with the same task is treated as a
    /// reconnect and refreshes the record (keeping `started_at` and the
    /// todo list). Fresh registrations clear any todo list left behind by
    /// an earlier incarnation of the session.
    pub async fn register_agent(
        &self,
        project_id: &str,
        session_name: &str,
        task_id: &str,
        branch: &str,
        description: &str,
    ) -> Result<Value, CoordinationError> {
        let existing = self.load_agent(project_id, session_name).await?;
        let mut record = AgentRecord::new(project_id, task_id, branch, description);
        let fresh = existing.is_none();
        if let Some(previous) = existing {
            if previous.is_active() && previous.task_id != task_id {
                return Ok(json!({
                    "status": "error",
                    "error": format!(
                        "session {session_name} is already registered for task {}; \
                         unregister it before claiming task {task_id}",
                        previous.task_id
                    ),
                }));
            }
            record.started_at = previous.started_at;
        }

        let mut ops = vec![
            WriteOp::HashSet {
                key: keys::agents(project_id),
                field: session_name.to_string(),
                value: serde_json::to_string(&record)?,
            },
            WriteOp::SetExpiring {
                key: keys::heartbeat(project_id, session_name),
                value: Utc::now().to_rfc3339(),
                ttl: self.config.heartbeat_timeout,
            },
        ];
        if fresh {
            ops.push(WriteOp::Delete {
                key: keys::todos(project_id, session_name),
            });
        }
        self.store.apply(ops).await?;

        let others: Vec<String> = self
            .active_sessions(project_id)
            .await?
            .into_iter()
            .filter(|session| session != session_name)
            .collect();

        self.fan_out(
            project_id,
            &Envelope::broadcast(
                session_name,
                "info",
                format!("Agent {session_name} joined the project: {description}"),
            ),
            Some(session_name),
        )
        .await?;

        info!(%project_id, %session_name, %task_id, "agent registered");

        Ok(json!({
            "status": "registered",
            "project_id": project_id,
            "session_name": session_name,
            "other_active_agents": others,
            "message": format!(
                "Successfully registered. {} other agents are active in this project.",
                others.len()
            ),
        }))
    }

    /// Refreshes the caller's heartbeat TTL. An agent whose record was
    /// reaped gets `not_registered` back and is expected to re-register;
    /// a heartbeat alone never resurrects it.
    pub async fn heartbeat(
        &self,
        project_id: &str,
        session_name: &str,
    ) -> Result<Value, CoordinationError> {
        if self.load_agent(project_id, session_name).await?.is_none() {
            return Ok(json!({
                "status": "not_registered",
                "error": format!(
                    "agent {session_name} is not registered in project {project_id}; \
                     call register_agent again"
                ),
            }));
        }
        self.touch_heartbeat(project_id, session_name).await?;
        Ok(json!({
            "status": "ok",
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }

    /// Map of every registered agent in the project to its record.
    pub async fn list_active_agents(&self, project_id: &str) -> Result<Value, CoordinationError> {
        let agents = self.store.hash_get_all(&keys::agents(project_id)).await?;
        let mut result = Map::new();
        for (session, raw) in agents {
            match serde_json::from_str::<Value>(&raw) {
                Ok(record) => {
                    result.insert(session, record);
                }
                Err(err) => warn!(%project_id, %session, error = %err, "corrupt agent record"),
            }
        }
        Ok(Value::Object(result))
    }

    /// Removes the agent and everything it owns, and reports the final todo
    /// tally. Interfaces it registered persist: those are project-owned.
    pub async fn unregister_agent(
        &self,
        project_id: &str,
        session_name: &str,
    ) -> Result<Value, CoordinationError> {
        if self.load_agent(project_id, session_name).await?.is_none() {
            return Ok(json!({
                "status": "not_found",
                "error": "Agent not registered",
            }));
        }

        let todos = self.load_todos(project_id, session_name).await?;
        let summary = TodoSummary::tally(&todos);
        self.purge_agent(project_id, session_name).await?;

        self.fan_out(
            project_id,
            &Envelope::broadcast(
                session_name,
                "info",
                format!(
                    "Agent {session_name} left the project ({}/{} todos completed)",
                    summary.completed, summary.total
                ),
            ),
            Some(session_name),
        )
        .await?;

        info!(%project_id, %session_name, "agent unregistered");

        Ok(json!({
            "status": "unregistered",
            "todo_summary": summary,
            "message": format!(
                "Successfully unregistered. Completed {}/{} todos.",
                summary.completed, summary.total
            ),
        }))
    }

    /// Writes the durable completion record consumed by orchestrators,
    /// flips the agent's status, drops a best-effort marker file under the
    /// configured status directory and announces the completion.
    pub async fn mark_task_completed(
        &self,
        project_id: &str,
        session_name: &str,
        task_id: &str,
    ) -> Result<Value, CoordinationError> {
        let record = CompletionRecord {
            task_id: task_id.to_string(),
            session_name: session_name.to_string(),
            completed_at: Utc::now(),
        };
        self.store
            .set(
                &keys::completed(project_id, task_id),
                &serde_json::to_string(&record)?,
            )
            .await?;

        if let Some(mut agent) = self.load_agent(project_id, session_name).await? {
            agent.status = AgentStatus::Completed;
            self.store
                .hash_set(
                    &keys::agents(project_id),
                    session_name,
                    &serde_json::to_string(&agent)?,
                )
                .await?;
        }

        write_status_marker(&self.config.status_dir, session_name);

        self.fan_out(
            project_id,
            &Envelope::broadcast(
                session_name,
                "task_completed",
                format!("Task {task_id} completed by {session_name}"),
            ),
            Some(session_name),
        )
        .await?;
        self.touch_heartbeat(project_id, session_name).await?;

        info!(%project_id, %session_name, %task_id, "task marked completed");

        Ok(json!({
            "status": "success",
            "message": format!("Task {task_id} marked as completed"),
        }))
    }
}

/// Best-effort side channel for orchestrators that watch the filesystem.
/// Failures are logged and swallowed; they never fail the tool call.
fn write_status_marker(status_dir: &Path, session_name: &str) {
    if let Err(err) = std::fs::create_dir_all(status_dir) {
        warn!(dir = %status_dir.display(), error = %err, "cannot create status dir");
        return;
    }
    let path = status_dir.join(format!("{session_name}.status"));
    if let Err(err) = std::fs::write(&path, "COMPLETED\n") {
        warn!(path = %path.display(), error = %err, "cannot write status marker");
    }
}
