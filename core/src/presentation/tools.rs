// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tool catalogue and dispatcher.
//!
//! The broker exposes a stable, enumerated set of tools; names, argument
//! schemas and return shapes are part of the contract. The consumers are
//! LLM agents, so every description (and every human `message` field in the
//! results) is written to be read by a model, not just a machine.
//!
//! Handlers never throw across the transport boundary: the dispatcher
//! converts every failure into a structured `{"status": "error", ...}`
//! result.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::application::{CoordinationError, CoordinationService};

pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

fn schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// The enumerated tool set, in the order agents usually discover it.
pub fn tool_catalogue() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "register_agent",
            description: "Register this agent for a project. Returns the other active agents so you know who to coordinate with. Re-registering the same session for the same task is a safe reconnect.",
            input_schema: schema(
                json!({
                    "project_id": {"type": "string", "description": "Project namespace"},
                    "session_name": {"type": "string", "description": "Unique session name, e.g. task-123"},
                    "task_id": {"type": "string", "description": "Task this agent works on"},
                    "branch": {"type": "string", "description": "Git branch for the task"},
                    "description": {"type": "string", "description": "Short task description"},
                }),
                &["project_id", "session_name", "task_id", "branch", "description"],
            ),
        },
        ToolDef {
            name: "heartbeat",
            description: "Signal that this agent is still alive. Call every 30-60 seconds; an agent whose heartbeat lapses is reaped and must re-register.",
            input_schema: schema(
                json!({
                    "project_id": {"type": "string"},
                    "session_name": {"type": "string"},
                }),
                &["project_id", "session_name"],
            ),
        },
        ToolDef {
            name: "unregister_agent",
            description: "Leave the project: releases your file locks, clears your queues and reports your final todo summary.",
            input_schema: schema(
                json!({
                    "project_id": {"type": "string"},
                    "session_name": {"type": "string"},
                }),
                &["project_id", "session_name"],
            ),
        },
        ToolDef {
            name: "list_active_agents",
            description: "List every registered agent in the project with its task, branch and status.",
            input_schema: schema(json!({"project_id": {"type": "string"}}), &["project_id"]),
        },
        ToolDef {
            name: "mark_task_completed",
            description: "Record that your task is finished. Writes a durable completion record the orchestrator watches for; call this before unregistering.",
            input_schema: schema(
                json!({
                    "project_id": {"type": "string"},
                    "session_name": {"type": "string"},
                    "task_id": {"type": "string"},
                }),
                &["project_id", "session_name", "task_id"],
            ),
        },
        ToolDef {
            name: "add_todo",
            description: "Add an item to your own todo list so other agents can see your progress.",
            input_schema: schema(
                json!({
                    "project_id": {"type": "string"},
                    "session_name": {"type": "string"},
                    "todo_item": {"type": "string", "description": "What needs doing"},
                    "priority": {"type": "integer", "description": "1=high, 2=medium, 3=low", "default": 1},
                }),
                &["project_id", "session_name", "todo_item"],
            ),
        },
        ToolDef {
            name: "update_todo",
            description: "Move one of your todos to pending, in_progress, completed or blocked.",
            input_schema: schema(
                json!({
                    "project_id": {"type": "string"},
                    "session_name": {"type": "string"},
                    "todo_id": {"type": "string"},
                    "status": {"type": "string", "enum": ["pending", "in_progress", "completed", "blocked"]},
                }),
                &["project_id", "session_name", "todo_id", "status"],
            ),
        },
        ToolDef {
            name: "get_my_todos",
            description: "List your own todos in insertion order.",
            input_schema: schema(
                json!({
                    "project_id": {"type": "string"},
                    "session_name": {"type": "string"},
                }),
                &["project_id", "session_name"],
            ),
        },
        ToolDef {
            name: "get_all_todos",
            description: "Todos for every agent in the project, keyed by session, with completion counters.",
            input_schema: schema(json!({"project_id": {"type": "string"}}), &["project_id"]),
        },
        ToolDef {
            name: "query_agent",
            description: "Ask another agent a question. With wait_for_response=true this call blocks until the target answers via respond_to_query or the timeout expires; with false it returns the message_id immediately and the answer arrives via check_messages.",
            input_schema: schema(
                json!({
                    "project_id": {"type": "string"},
                    "from_session": {"type": "string"},
                    "to_session": {"type": "string"},
                    "query_type": {"type": "string", "description": "Category, e.g. api, schema, status"},
                    "query": {"type": "string"},
                    "wait_for_response": {"type": "boolean", "default": true},
                    "timeout": {"type": "integer", "description": "Seconds to wait, max 300", "default": 30},
                }),
                &["project_id", "from_session", "to_session", "query_type", "query"],
            ),
        },
        ToolDef {
            name: "check_messages",
            description: "Drain your message queue: returns every queued envelope and clears the queue. Check regularly; other agents may be waiting on a query you have not seen.",
            input_schema: schema(
                json!({
                    "project_id": {"type": "string"},
                    "session_name": {"type": "string"},
                }),
                &["project_id", "session_name"],
            ),
        },
        ToolDef {
            name: "respond_to_query",
            description: "Answer a query you received via check_messages. message_id must be the id from the query envelope.",
            input_schema: schema(
                json!({
                    "project_id": {"type": "string"},
                    "from_session": {"type": "string", "description": "Your session (the responder)"},
                    "to_session": {"type": "string", "description": "The original asker"},
                    "message_id": {"type": "string"},
                    "response": {"type": "string"},
                }),
                &["project_id", "from_session", "to_session", "message_id", "response"],
            ),
        },
        ToolDef {
            name: "broadcast_message",
            description: "Send a message to every other active agent in the project.",
            input_schema: schema(
                json!({
                    "project_id": {"type": "string"},
                    "session_name": {"type": "string"},
                    "message_type": {"type": "string", "description": "e.g. info, warning, discovery"},
                    "content": {"type": "string"},
                }),
                &["project_id", "session_name", "message_type", "content"],
            ),
        },
        ToolDef {
            name: "announce_file_change",
            description: "Declare that you are about to modify a file. Acquires an advisory lock; if another agent holds it you get a conflict with their lock info instead. Locks are honored by convention, never enforced.",
            input_schema: schema(
                json!({
                    "project_id": {"type": "string"},
                    "session_name": {"type": "string"},
                    "file_path": {"type": "string"},
                    "change_type": {"type": "string", "description": "e.g. create, modify, delete, refactor"},
                    "description": {"type": "string"},
                }),
                &["project_id", "session_name", "file_path", "change_type", "description"],
            ),
        },
        ToolDef {
            name: "release_file_lock",
            description: "Release an advisory lock you hold. Releasing an already-free path succeeds; releasing someone else's lock is refused.",
            input_schema: schema(
                json!({
                    "project_id": {"type": "string"},
                    "session_name": {"type": "string"},
                    "file_path": {"type": "string"},
                }),
                &["project_id", "session_name", "file_path"],
            ),
        },
        ToolDef {
            name: "get_recent_changes",
            description: "Recent file-change announcements in the project, newest first.",
            input_schema: schema(
                json!({
                    "project_id": {"type": "string"},
                    "limit": {"type": "integer", "default": 20, "description": "Max entries, capped at 100"},
                }),
                &["project_id"],
            ),
        },
        ToolDef {
            name: "register_interface",
            description: "Publish a shared type or interface definition for other agents to discover. Registering an existing name overwrites it.",
            input_schema: schema(
                json!({
                    "project_id": {"type": "string"},
                    "session_name": {"type": "string"},
                    "interface_name": {"type": "string"},
                    "definition": {"type": "string"},
                    "file_path": {"type": "string", "description": "Where the definition lives (optional)"},
                }),
                &["project_id", "session_name", "interface_name", "definition"],
            ),
        },
        ToolDef {
            name: "query_interface",
            description: "Fetch a registered interface definition by name. On a miss you get a list of similar names.",
            input_schema: schema(
                json!({
                    "project_id": {"type": "string"},
                    "interface_name": {"type": "string"},
                }),
                &["project_id", "interface_name"],
            ),
        },
        ToolDef {
            name: "list_interfaces",
            description: "Every registered interface in the project with who registered it and when.",
            input_schema: schema(json!({"project_id": {"type": "string"}}), &["project_id"]),
        },
    ]
}

#[derive(Debug, thiserror::Error)]
enum DispatchError {
    #[error("unknown tool {0}")]
    UnknownTool(String),

    #[error("missing arg {0}")]
    MissingArg(&'static str),

    #[error("invalid arg {0}: expected {1}")]
    InvalidArg(&'static str, &'static str),

    #[error(transparent)]
    Coordination(#[from] CoordinationError),
}

/// Routes `(tool_name, arguments)` into the coordination service and
/// serializes the outcome. Cheap to clone; the transport spawns one task
/// per in-flight call.
#[derive(Clone)]
pub struct Dispatcher {
    service: Arc<CoordinationService>,
}

impl Dispatcher {
    pub fn new(service: Arc<CoordinationService>) -> Self {
        Self { service }
    }

    pub fn list_tools(&self) -> Value {
        Value::Array(
            tool_catalogue()
                .into_iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "input_schema": tool.input_schema,
                    })
                })
                .collect(),
        )
    }

    pub async fn call_tool(&self, name: &str, args: &Value) -> Value {
        match self.dispatch(name, args).await {
            Ok(result) => result,
            Err(DispatchError::Coordination(CoordinationError::StoreUnavailable(message))) => {
                json!({"status": "store_unavailable", "error": message})
            }
            Err(err) => json!({"status": "error", "error": err.to_string()}),
        }
    }

    async fn dispatch(&self, name: &str, args: &Value) -> Result<Value, DispatchError> {
        let service = &self.service;
        let result = match name {
            "register_agent" => {
                service
                    .register_agent(
                        req_str(args, "project_id")?,
                        req_str(args, "session_name")?,
                        req_str(args, "task_id")?,
                        req_str(args, "branch")?,
                        req_str(args, "description")?,
                    )
                    .await?
            }
            "heartbeat" => {
                service
                    .heartbeat(req_str(args, "project_id")?, req_str(args, "session_name")?)
                    .await?
            }
            "unregister_agent" => {
                service
                    .unregister_agent(req_str(args, "project_id")?, req_str(args, "session_name")?)
                    .await?
            }
            "list_active_agents" => {
                service
                    .list_active_agents(req_str(args, "project_id")?)
                    .await?
            }
            "mark_task_completed" => {
                service
                    .mark_task_completed(
                        req_str(args, "project_id")?,
                        req_str(args, "session_name")?,
                        req_str(args, "task_id")?,
                    )
                    .await?
            }
            "add_todo" => {
                service
                    .add_todo(
                        req_str(args, "project_id")?,
                        req_str(args, "session_name")?,
                        req_str(args, "todo_item")?,
                        opt_i64(args, "priority", 1)?,
                    )
                    .await?
            }
            "update_todo" => {
                service
                    .update_todo(
                        req_str(args, "project_id")?,
                        req_str(args, "session_name")?,
                        req_str(args, "todo_id")?,
                        req_str(args, "status")?,
                    )
                    .await?
            }
            "get_my_todos" => {
                service
                    .get_my_todos(req_str(args, "project_id")?, req_str(args, "session_name")?)
                    .await?
            }
            "get_all_todos" => service.get_all_todos(req_str(args, "project_id")?).await?,
            "query_agent" => {
                service
                    .query_agent(
                        req_str(args, "project_id")?,
                        req_str(args, "from_session")?,
                        req_str(args, "to_session")?,
                        req_str(args, "query_type")?,
                        req_str(args, "query")?,
                        opt_bool(args, "wait_for_response", true)?,
                        opt_i64(args, "timeout", 30)?,
                    )
                    .await?
            }
            "check_messages" => {
                service
                    .check_messages(req_str(args, "project_id")?, req_str(args, "session_name")?)
                    .await?
            }
            "respond_to_query" => {
                service
                    .respond_to_query(
                        req_str(args, "project_id")?,
                        req_str(args, "from_session")?,
                        req_str(args, "to_session")?,
                        req_str(args, "message_id")?,
                        req_str(args, "response")?,
                    )
                    .await?
            }
            "broadcast_message" => {
                service
                    .broadcast_message(
                        req_str(args, "project_id")?,
                        req_str(args, "session_name")?,
                        req_str(args, "message_type")?,
                        req_str(args, "content")?,
                    )
                    .await?
            }
            "announce_file_change" => {
                service
                    .announce_file_change(
                        req_str(args, "project_id")?,
                        req_str(args, "session_name")?,
                        req_str(args, "file_path")?,
                        req_str(args, "change_type")?,
                        req_str(args, "description")?,
                    )
                    .await?
            }
            "release_file_lock" => {
                service
                    .release_file_lock(
                        req_str(args, "project_id")?,
                        req_str(args, "session_name")?,
                        req_str(args, "file_path")?,
                    )
                    .await?
            }
            "get_recent_changes" => {
                service
                    .get_recent_changes(req_str(args, "project_id")?, opt_i64(args, "limit", 20)?)
                    .await?
            }
            "register_interface" => {
                service
                    .register_interface(
                        req_str(args, "project_id")?,
                        req_str(args, "session_name")?,
                        req_str(args, "interface_name")?,
                        req_str(args, "definition")?,
                        opt_str(args, "file_path")?,
                    )
                    .await?
            }
            "query_interface" => {
                service
                    .query_interface(
                        req_str(args, "project_id")?,
                        req_str(args, "interface_name")?,
                    )
                    .await?
            }
            "list_interfaces" => service.list_interfaces(req_str(args, "project_id")?).await?,
            other => return Err(DispatchError::UnknownTool(other.to_string())),
        };
        Ok(result)
    }
}

fn req_str<'a>(args: &'a Value, name: &'static str) -> Result<&'a str, DispatchError> {
    match args.get(name) {
        None | Some(Value::Null) => Err(DispatchError::MissingArg(name)),
        Some(Value::String(value)) => Ok(value),
        Some(_) => Err(DispatchError::InvalidArg(name, "string")),
    }
}

fn opt_str<'a>(args: &'a Value, name: &'static str) -> Result<Option<&'a str>, DispatchError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(_) => Err(DispatchError::InvalidArg(name, "string")),
    }
}

fn opt_i64(args: &Value, name: &'static str, default: i64) -> Result<i64, DispatchError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(value)) => value
            .as_i64()
            .ok_or(DispatchError::InvalidArg(name, "integer")),
        Some(_) => Err(DispatchError::InvalidArg(name, "integer")),
    }
}

fn opt_bool(args: &Value, name: &'static str, default: bool) -> Result<bool, DispatchError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(value)) => Ok(*value),
        Some(_) => Err(DispatchError::InvalidArg(name, "boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_names_are_unique_and_complete() {
        let tools = tool_catalogue();
        assert_eq!(tools.len(), 19);
        let mut names: Vec<&str> = tools.iter().map(|tool| tool.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 19);
        assert!(names.contains(&"query_agent"));
        assert!(names.contains(&"announce_file_change"));
    }

    #[test]
    fn every_schema_requires_project_id() {
        for tool in tool_catalogue() {
            let required = tool.input_schema["required"]
                .as_array()
                .unwrap_or_else(|| panic!("{} has no required list", tool.name));
            assert!(
                required.iter().any(|r| r == "project_id"),
                "{} must require project_id",
                tool.name
            );
        }
    }
}
