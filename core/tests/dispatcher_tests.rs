// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Dispatcher-level contract tests: argument validation, routing and the
//! heartbeat side effect.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use swarmlink_core::application::CoordinationService;
use swarmlink_core::domain::config::BrokerConfig;
use swarmlink_core::domain::store::keys;
use swarmlink_core::infrastructure::store::MemoryStore;
use swarmlink_core::presentation::Dispatcher;

fn dispatcher() -> (Dispatcher, Arc<CoordinationService>) {
    let config = BrokerConfig {
        query_poll_interval: Duration::from_millis(10),
        ..BrokerConfig::default()
    };
    let service = Arc::new(CoordinationService::new(
        Arc::new(MemoryStore::new()),
        config,
    ));
    (Dispatcher::new(service.clone()), service)
}

async fn register(dispatcher: &Dispatcher, session: &str, task: &str) {
    let result = dispatcher
        .call_tool(
            "register_agent",
            &json!({
                "project_id": "p",
                "session_name": session,
                "task_id": task,
                "branch": "feat/x",
                "description": "dispatcher test",
            }),
        )
        .await;
    assert_eq!(result["status"], "registered");
}

#[tokio::test]
async fn missing_required_argument_is_reported() {
    let (dispatcher, _) = dispatcher();
    let result = dispatcher
        .call_tool("register_agent", &json!({"project_id": "p"}))
        .await;
    assert_eq!(result["status"], "error");
    assert!(result["error"]
        .as_str()
        .unwrap()
        .contains("missing arg session_name"));
}

#[tokio::test]
async fn unknown_tool_is_an_error_not_a_crash() {
    let (dispatcher, _) = dispatcher();
    let result = dispatcher.call_tool("launch_missiles", &json!({})).await;
    assert_eq!(result["status"], "error");
    assert!(result["error"].as_str().unwrap().contains("unknown tool"));
}

#[tokio::test]
async fn wrongly_typed_argument_is_rejected() {
    let (dispatcher, _) = dispatcher();
    register(&dispatcher, "task-001", "001").await;
    let result = dispatcher
        .call_tool(
            "add_todo",
            &json!({
                "project_id": "p",
                "session_name": "task-001",
                "todo_item": "x",
                "priority": "high",
            }),
        )
        .await;
    assert_eq!(result["status"], "error");
    assert!(result["error"].as_str().unwrap().contains("invalid arg priority"));
}

#[tokio::test]
async fn list_tools_enumerates_the_full_catalogue() {
    let (dispatcher, _) = dispatcher();
    let tools = dispatcher.list_tools();
    let tools = tools.as_array().unwrap();
    assert_eq!(tools.len(), 19);
    for tool in tools {
        assert!(tool["name"].is_string());
        assert!(tool["description"].is_string());
        assert_eq!(tool["input_schema"]["type"], "object");
    }
}

#[tokio::test]
async fn mutating_calls_refresh_the_heartbeat() {
    let (dispatcher, service) = dispatcher();
    register(&dispatcher, "task-001", "001").await;

    // Simulate TTL expiry, then confirm a mutating call restores it.
    service
        .store()
        .delete(&keys::heartbeat("p", "task-001"))
        .await
        .unwrap();
    let result = dispatcher
        .call_tool(
            "add_todo",
            &json!({
                "project_id": "p",
                "session_name": "task-001",
                "todo_item": "stay alive",
                "priority": 1,
            }),
        )
        .await;
    assert_eq!(result["status"], "added");
    assert!(service
        .store()
        .get(&keys::heartbeat("p", "task-001"))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn defaults_apply_for_optional_arguments() {
    let (dispatcher, _) = dispatcher();
    register(&dispatcher, "task-001", "001").await;

    // priority defaults to 1.
    let added = dispatcher
        .call_tool(
            "add_todo",
            &json!({
                "project_id": "p",
                "session_name": "task-001",
                "todo_item": "defaulted",
            }),
        )
        .await;
    assert_eq!(added["status"], "added");

    let todos = dispatcher
        .call_tool(
            "get_my_todos",
            &json!({"project_id": "p", "session_name": "task-001"}),
        )
        .await;
    assert_eq!(todos["todos"][0]["priority"], 1);

    // get_recent_changes defaults its limit.
    let changes = dispatcher
        .call_tool("get_recent_changes", &json!({"project_id": "p"}))
        .await;
    assert!(changes.is_array());
}

#[tokio::test]
async fn lock_conflict_surface_matches_contract() {
    let (dispatcher, _) = dispatcher();
    register(&dispatcher, "task-001", "001").await;
    register(&dispatcher, "task-002", "002").await;

    let locked = dispatcher
        .call_tool(
            "announce_file_change",
            &json!({
                "project_id": "p",
                "session_name": "task-001",
                "file_path": "src/x.ts",
                "change_type": "modify",
                "description": "X",
            }),
        )
        .await;
    assert_eq!(locked["status"], "locked");

    let conflict = dispatcher
        .call_tool(
            "announce_file_change",
            &json!({
                "project_id": "p",
                "session_name": "task-002",
                "file_path": "src/x.ts",
                "change_type": "modify",
                "description": "Y",
            }),
        )
        .await;
    assert_eq!(conflict["status"], "conflict");
    assert_eq!(conflict["lock_info"]["session_name"], "task-001");
    assert!(conflict["message"].is_null());
    assert!(conflict["error"].is_string());
}
