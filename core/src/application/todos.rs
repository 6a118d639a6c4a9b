// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Per-agent todo lists.

use serde_json::{json, Map, Value};

use crate::domain::message::Envelope;
use crate::domain::store::{keys, WriteOp};
use crate::domain::todo::{TodoItem, TodoStatus, VALID_PRIORITIES};

use super::service::{CoordinationError, CoordinationService};

impl CoordinationService {
    pub async fn add_todo(
        &self,
        project_id: &str,
        session_name: &str,
        todo_item: &str,
        priority: i64,
    ) -> Result<Value, CoordinationError> {
        let priority = match u8::try_from(priority).ok().filter(|p| VALID_PRIORITIES.contains(p)) {
            Some(priority) => priority,
            None => {
                return Ok(json!({
                    "status": "error",
                    "error": "priority must be 1 (high), 2 (medium) or 3 (low)",
                }))
            }
        };

        let todo = TodoItem::new(&self.next_todo_id(), todo_item, priority);
        self.store
            .list_push_back(
                &keys::todos(project_id, session_name),
                &serde_json::to_string(&todo)?,
            )
            .await?;
        self.touch_heartbeat(project_id, session_name).await?;

        Ok(json!({
            "status": "added",
            "todo_id": todo.id,
            "message": format!("Added todo: {todo_item}"),
        }))
    }

    /// Rewrites the matching entry in place. The whole list is replaced in
    /// one atomic group so readers never see a half-updated list.
    pub async fn update_todo(
        &self,
        project_id: &str,
        session_name: &str,
        todo_id: &str,
        status: &str,
    ) -> Result<Value, CoordinationError> {
        let new_status = match TodoStatus::parse(status) {
            Some(status) => status,
            None => {
                return Ok(json!({
                    "status": "error",
                    "error": format!(
                        "invalid status {status:?}; expected pending, in_progress, completed or blocked"
                    ),
                }))
            }
        };

        let mut todos = self.load_todos(project_id, session_name).await?;
        let mut found = false;
        for todo in &mut todos {
            if todo.id == todo_id {
                todo.set_status(new_status);
                found = true;
            }
        }
        if !found {
            return Ok(json!({
                "status": "not_found",
                "todo_id": todo_id,
                "error": format!("no todo with id {todo_id}"),
            }));
        }

        let todos_key = keys::todos(project_id, session_name);
        let mut ops = vec![WriteOp::Delete {
            key: todos_key.clone(),
        }];
        for todo in &todos {
            ops.push(WriteOp::ListPushBack {
                key: todos_key.clone(),
                value: serde_json::to_string(todo)?,
            });
        }
        self.store.apply(ops).await?;

        if new_status == TodoStatus::Completed {
            self.fan_out(
                project_id,
                &Envelope::broadcast(
                    session_name,
                    "todo_completed",
                    format!("{session_name} completed todo {todo_id}"),
                ),
                Some(session_name),
            )
            .await?;
        }
        self.touch_heartbeat(project_id, session_name).await?;

        Ok(json!({
            "status": "updated",
            "todo_id": todo_id,
            "new_status": new_status.as_str(),
        }))
    }

    pub async fn get_my_todos(
        &self,
        project_id: &str,
        session_name: &str,
    ) -> Result<Value, CoordinationError> {
        let todos = self.load_todos(project_id, session_name).await?;
        self.touch_heartbeat(project_id, session_name).await?;
        Ok(json!({
            "session_name": session_name,
            "total": todos.len(),
            "todos": todos,
        }))
    }

    /// Todos for every registered agent, keyed by session, with summary
    /// counters alongside.
    pub async fn get_all_todos(&self, project_id: &str) -> Result<Value, CoordinationError> {
        let agents = self.store.hash_get_all(&keys::agents(project_id)).await?;
        let mut result = Map::new();
        for (session, raw) in agents {
            let info: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);
            let todos = self.load_todos(project_id, &session).await?;
            let completed = todos
                .iter()
                .filter(|todo| todo.status == TodoStatus::Completed)
                .count();
            result.insert(
                session,
                json!({
                    "task_id": info.get("task_id").cloned().unwrap_or(Value::Null),
                    "description": info.get("description").cloned().unwrap_or(Value::Null),
                    "total": todos.len(),
                    "completed": completed,
                    "todos": todos,
                }),
            );
        }
        Ok(Value::Object(result))
    }
}
