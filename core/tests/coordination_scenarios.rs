// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! End-to-end coordination scenarios over the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use swarmlink_core::application::{CoordinationService, LivenessMonitor};
use swarmlink_core::domain::config::BrokerConfig;
use swarmlink_core::domain::store::keys;
use swarmlink_core::infrastructure::store::MemoryStore;

fn test_config() -> BrokerConfig {
    BrokerConfig {
        query_poll_interval: Duration::from_millis(10),
        ..BrokerConfig::default()
    }
}

fn service_with(config: BrokerConfig) -> Arc<CoordinationService> {
    Arc::new(CoordinationService::new(Arc::new(MemoryStore::new()), config))
}

fn service() -> Arc<CoordinationService> {
    service_with(test_config())
}

async fn register(service: &CoordinationService, project: &str, session: &str, task: &str) -> Value {
    service
        .register_agent(project, session, task, &format!("feat/{task}"), "test agent")
        .await
        .expect("register_agent")
}

fn as_array(value: Value) -> Vec<Value> {
    value.as_array().cloned().expect("expected array result")
}

#[tokio::test]
async fn two_agents_one_handshake() {
    let service = service();

    let first = register(&service, "p", "task-001", "001").await;
    assert_eq!(first["status"], "registered");
    assert_eq!(first["other_active_agents"], serde_json::json!([]));

    let second = register(&service, "p", "task-002", "002").await;
    assert_eq!(second["other_active_agents"], serde_json::json!(["task-001"]));

    let messages = as_array(service.check_messages("p", "task-001").await.unwrap());
    assert_eq!(messages.len(), 1);
    let joined = &messages[0];
    assert_eq!(joined["type"], "broadcast");
    assert_eq!(joined["from"], "task-002");
    assert_eq!(joined["message_type"], "info");
    assert!(joined["content"].as_str().unwrap().contains("joined"));

    // Drains: a second check comes back empty.
    let drained = as_array(service.check_messages("p", "task-001").await.unwrap());
    assert!(drained.is_empty());
}

#[tokio::test]
async fn reregistering_for_a_different_task_is_rejected() {
    let service = service();
    register(&service, "p", "task-001", "001").await;

    let rejected = register(&service, "p", "task-001", "002").await;
    assert_eq!(rejected["status"], "error");

    // Same task is a reconnect, not a conflict, and keeps the todo list.
    service
        .add_todo("p", "task-001", "keep me", 1)
        .await
        .unwrap();
    let reconnected = register(&service, "p", "task-001", "001").await;
    assert_eq!(reconnected["status"], "registered");
    let todos = service.get_my_todos("p", "task-001").await.unwrap();
    assert_eq!(todos["total"], 1);
}

#[tokio::test]
async fn lock_conflict_and_release() {
    let service = service();
    register(&service, "p", "task-001", "001").await;
    register(&service, "p", "task-002", "002").await;

    let locked = service
        .announce_file_change("p", "task-001", "src/x.ts", "modify", "X")
        .await
        .unwrap();
    assert_eq!(locked["status"], "locked");

    let conflict = service
        .announce_file_change("p", "task-002", "src/x.ts", "modify", "Y")
        .await
        .unwrap();
    assert_eq!(conflict["status"], "conflict");
    assert_eq!(conflict["lock_info"]["session_name"], "task-001");
    assert!(conflict["suggestion"].is_string());

    let released = service
        .release_file_lock("p", "task-001", "src/x.ts")
        .await
        .unwrap();
    assert_eq!(released["status"], "released");

    let relocked = service
        .announce_file_change("p", "task-002", "src/x.ts", "modify", "Y")
        .await
        .unwrap();
    assert_eq!(relocked["status"], "locked");
}

#[tokio::test]
async fn announce_is_reentrant_for_the_owner() {
    let service = service();
    register(&service, "p", "task-001", "001").await;

    let first = service
        .announce_file_change("p", "task-001", "src/a.rs", "modify", "pass one")
        .await
        .unwrap();
    assert_eq!(first["status"], "locked");
    let again = service
        .announce_file_change("p", "task-001", "src/a.rs", "modify", "pass two")
        .await
        .unwrap();
    assert_eq!(again["status"], "locked");
}

#[tokio::test]
async fn non_owner_release_mutates_nothing() {
    let service = service();
    register(&service, "p", "task-001", "001").await;
    register(&service, "p", "task-002", "002").await;

    service
        .announce_file_change("p", "task-001", "src/x.ts", "modify", "X")
        .await
        .unwrap();

    let refused = service
        .release_file_lock("p", "task-002", "src/x.ts")
        .await
        .unwrap();
    assert_eq!(refused["status"], "error");

    // Still held by the owner.
    let raw = service
        .store()
        .hash_get(&keys::locks("p"), "src/x.ts")
        .await
        .unwrap()
        .expect("lock still present");
    assert!(raw.contains("task-001"));

    // Releasing an unheld path is an idempotent success.
    let idempotent = service
        .release_file_lock("p", "task-001", "src/never-locked.ts")
        .await
        .unwrap();
    assert_eq!(idempotent["status"], "released");
}

#[tokio::test]
async fn concurrent_announcements_have_one_winner() {
    let service = service();
    for i in 0..8 {
        register(&service, "p", &format!("task-{i:03}"), &format!("{i:03}")).await;
    }

    let mut handles = Vec::new();
    for i in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .announce_file_change(
                    "p",
                    &format!("task-{i:03}"),
                    "src/contested.rs",
                    "modify",
                    "race",
                )
                .await
                .unwrap()
        }));
    }

    let mut locked = 0;
    let mut conflicts = 0;
    for handle in handles {
        let result = handle.await.unwrap();
        match result["status"].as_str().unwrap() {
            "locked" => locked += 1,
            "conflict" => conflicts += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(locked, 1);
    assert_eq!(conflicts, 7);
}

#[tokio::test]
async fn synchronous_query_with_response() {
    let service = service();
    register(&service, "p", "task-001", "001").await;
    register(&service, "p", "task-002", "002").await;
    // Clear the join broadcast so the queue only holds the query.
    service.check_messages("p", "task-001").await.unwrap();

    let asker = service.clone();
    let parked = tokio::spawn(async move {
        asker
            .query_agent("p", "task-002", "task-001", "api", "return type?", true, 10)
            .await
            .unwrap()
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    let inbox = as_array(service.check_messages("p", "task-001").await.unwrap());
    let query = inbox
        .iter()
        .find(|message| message["type"] == "query")
        .expect("query envelope delivered");
    assert_eq!(query["from"], "task-002");
    assert_eq!(query["requires_response"], true);
    let message_id = query["id"].as_str().unwrap().to_string();

    let sent = service
        .respond_to_query("p", "task-001", "task-002", &message_id, "Result<T>")
        .await
        .unwrap();
    assert_eq!(sent["status"], "response_sent");

    let result = parked.await.unwrap();
    assert_eq!(result["status"], "received");
    assert_eq!(result["response"], "Result<T>");

    // The parked caller consumed the response; a drain must not see it.
    let leftover = as_array(service.check_messages("p", "task-002").await.unwrap());
    assert!(
        leftover.iter().all(|message| message["type"] != "response"),
        "response envelope leaked into check_messages: {leftover:?}"
    );
}

#[tokio::test]
async fn asynchronous_query_response_arrives_via_drain() {
    let service = service();
    register(&service, "p", "task-001", "001").await;
    register(&service, "p", "task-002", "002").await;

    let sent = service
        .query_agent("p", "task-002", "task-001", "api", "status?", false, 30)
        .await
        .unwrap();
    assert_eq!(sent["status"], "sent");
    let message_id = sent["message_id"].as_str().unwrap().to_string();

    service
        .respond_to_query("p", "task-001", "task-002", &message_id, "green")
        .await
        .unwrap();

    let inbox = as_array(service.check_messages("p", "task-002").await.unwrap());
    let response = inbox
        .iter()
        .find(|message| message["type"] == "response")
        .expect("response envelope queued");
    assert_eq!(response["in_reply_to"], message_id.as_str());
    assert_eq!(response["content"], "green");
}

#[tokio::test]
async fn query_times_out_promptly() {
    let service = service();
    register(&service, "p", "task-001", "001").await;
    register(&service, "p", "task-002", "002").await;

    let started = std::time::Instant::now();
    let result = service
        .query_agent("p", "task-002", "task-001", "api", "anyone?", true, 1)
        .await
        .unwrap();
    assert_eq!(result["status"], "timeout");
    assert!(started.elapsed() <= Duration::from_millis(1500));
}

#[tokio::test]
async fn zero_timeout_returns_immediately() {
    let service = service();
    register(&service, "p", "task-001", "001").await;
    register(&service, "p", "task-002", "002").await;

    let started = std::time::Instant::now();
    let result = service
        .query_agent("p", "task-002", "task-001", "api", "now?", true, 0)
        .await
        .unwrap();
    assert_eq!(result["status"], "timeout");
    assert!(started.elapsed() < Duration::from_millis(200));
}

#[tokio::test]
async fn query_to_unknown_agent_fails_fast() {
    let service = service();
    register(&service, "p", "task-002", "002").await;

    let result = service
        .query_agent("p", "task-002", "task-404", "api", "hello?", true, 5)
        .await
        .unwrap();
    assert_eq!(result["status"], "agent_not_found");
}

#[tokio::test]
async fn heartbeat_expiry_reaps_agent_and_locks() {
    let config = BrokerConfig {
        heartbeat_timeout: Duration::from_millis(50),
        ..test_config()
    };
    let service = service_with(config);
    register(&service, "p", "task-001", "001").await;
    service
        .announce_file_change("p", "task-001", "src/x.ts", "modify", "X")
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(120)).await;

    let monitor = LivenessMonitor::new(service.clone());
    let reaped = monitor.sweep().await.unwrap();
    assert_eq!(reaped, 1);

    let agents = service.list_active_agents("p").await.unwrap();
    assert!(agents.as_object().unwrap().is_empty());

    // Reap completeness: no lock, no queue, no todos.
    assert!(service
        .store()
        .hash_get(&keys::locks("p"), "src/x.ts")
        .await
        .unwrap()
        .is_none());
    assert!(service
        .store()
        .list_range(&keys::messages("p", "task-001"), 0, -1)
        .await
        .unwrap()
        .is_empty());
    assert!(service
        .store()
        .list_range(&keys::todos("p", "task-001"), 0, -1)
        .await
        .unwrap()
        .is_empty());

    // The reap left a system entry in recent changes.
    let changes = as_array(service.get_recent_changes("p", 20).await.unwrap());
    assert!(changes
        .iter()
        .any(|change| change["change_type"] == "system"
            && change["description"].as_str().unwrap().contains("reaped")));

    // A second sweep finds nothing; reaping is idempotent.
    assert_eq!(monitor.sweep().await.unwrap(), 0);

    // The reaped agent's heartbeat now reports not_registered.
    let stale = service.heartbeat("p", "task-001").await.unwrap();
    assert_eq!(stale["status"], "not_registered");
}

#[tokio::test]
async fn reap_wakes_parked_queries_with_agent_not_found() {
    let config = BrokerConfig {
        heartbeat_timeout: Duration::from_millis(50),
        ..test_config()
    };
    let service = service_with(config);
    register(&service, "p", "task-001", "001").await;
    register(&service, "p", "task-002", "002").await;

    let asker = service.clone();
    let parked = tokio::spawn(async move {
        asker
            .query_agent("p", "task-002", "task-001", "api", "alive?", true, 10)
            .await
            .unwrap()
    });
    tokio::time::sleep(Duration::from_millis(120)).await;

    LivenessMonitor::new(service.clone()).sweep().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), parked)
        .await
        .expect("parked query woke up")
        .unwrap();
    assert_eq!(result["status"], "agent_not_found");
}

#[tokio::test]
async fn unregister_after_reap_is_a_clean_no_op() {
    let config = BrokerConfig {
        heartbeat_timeout: Duration::from_millis(50),
        ..test_config()
    };
    let service = service_with(config);
    register(&service, "p", "task-001", "001").await;
    tokio::time::sleep(Duration::from_millis(120)).await;
    LivenessMonitor::new(service.clone()).sweep().await.unwrap();

    let result = service.unregister_agent("p", "task-001").await.unwrap();
    assert_eq!(result["status"], "not_found");
}

#[tokio::test]
async fn register_unregister_leaves_no_trace() {
    let service = service();
    register(&service, "p", "task-001", "001").await;
    service.add_todo("p", "task-001", "a", 1).await.unwrap();
    service
        .announce_file_change("p", "task-001", "src/x.ts", "modify", "X")
        .await
        .unwrap();

    let result = service.unregister_agent("p", "task-001").await.unwrap();
    assert_eq!(result["status"], "unregistered");
    assert_eq!(result["todo_summary"]["total"], 1);
    assert_eq!(result["todo_summary"]["pending"], 1);

    let agents = service.list_active_agents("p").await.unwrap();
    assert!(agents.as_object().unwrap().is_empty());
    assert!(service
        .store()
        .hash_get(&keys::locks("p"), "src/x.ts")
        .await
        .unwrap()
        .is_none());
    assert!(service
        .store()
        .scan("project:p:todos:*")
        .await
        .unwrap()
        .is_empty());
    assert!(service
        .store()
        .scan("project:p:messages:*")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn todo_round_trip_and_completion_stamp() {
    let service = service();
    register(&service, "p", "task-001", "001").await;

    let added = service
        .add_todo("p", "task-001", "write the parser", 2)
        .await
        .unwrap();
    assert_eq!(added["status"], "added");
    let todo_id = added["todo_id"].as_str().unwrap().to_string();

    let mine = service.get_my_todos("p", "task-001").await.unwrap();
    assert_eq!(mine["total"], 1);
    assert_eq!(mine["todos"][0]["status"], "pending");
    assert_eq!(mine["todos"][0]["priority"], 2);

    let updated = service
        .update_todo("p", "task-001", &todo_id, "completed")
        .await
        .unwrap();
    assert_eq!(updated["status"], "updated");
    assert_eq!(updated["new_status"], "completed");

    let mine = service.get_my_todos("p", "task-001").await.unwrap();
    assert_eq!(mine["todos"][0]["status"], "completed");
    assert!(mine["todos"][0]["completed_at"].is_string());

    let missing = service
        .update_todo("p", "task-001", "todo-does-not-exist", "completed")
        .await
        .unwrap();
    assert_eq!(missing["status"], "not_found");

    let bad_priority = service.add_todo("p", "task-001", "x", 9).await.unwrap();
    assert_eq!(bad_priority["status"], "error");
}

#[tokio::test]
async fn get_all_todos_includes_summary_counters() {
    let service = service();
    register(&service, "p", "task-001", "001").await;
    register(&service, "p", "task-002", "002").await;

    let added = service.add_todo("p", "task-001", "a", 1).await.unwrap();
    service.add_todo("p", "task-001", "b", 1).await.unwrap();
    service
        .update_todo("p", "task-001", added["todo_id"].as_str().unwrap(), "completed")
        .await
        .unwrap();

    let all = service.get_all_todos("p").await.unwrap();
    assert_eq!(all["task-001"]["total"], 2);
    assert_eq!(all["task-001"]["completed"], 1);
    assert_eq!(all["task-002"]["total"], 0);
}

#[tokio::test]
async fn queue_overflow_drops_oldest_and_coalesces_sentinel() {
    let config = BrokerConfig {
        max_queue_len: 5,
        ..test_config()
    };
    let service = service_with(config);
    register(&service, "p", "task-001", "001").await;
    register(&service, "p", "task-002", "002").await;
    service.check_messages("p", "task-001").await.unwrap();

    for i in 0..7 {
        service
            .broadcast_message("p", "task-002", "info", &format!("m{i}"))
            .await
            .unwrap();
    }

    let inbox = as_array(service.check_messages("p", "task-001").await.unwrap());
    assert_eq!(inbox.len(), 5);
    assert_eq!(inbox[0]["type"], "system");
    assert_eq!(inbox[0]["content"], "messages dropped");
    assert_eq!(
        inbox.iter().filter(|message| message["type"] == "system").count(),
        1,
        "overflow sentinels must coalesce"
    );
    assert_eq!(inbox.last().unwrap()["content"], "m6");
}

#[tokio::test]
async fn concurrent_drains_return_disjoint_sets() {
    let service = service();
    register(&service, "p", "task-001", "001").await;
    register(&service, "p", "task-002", "002").await;
    service.check_messages("p", "task-001").await.unwrap();

    for i in 0..50 {
        service
            .broadcast_message("p", "task-002", "info", &format!("m{i}"))
            .await
            .unwrap();
    }

    let a = service.clone();
    let b = service.clone();
    let (left, right) = tokio::join!(
        tokio::spawn(async move { a.check_messages("p", "task-001").await.unwrap() }),
        tokio::spawn(async move { b.check_messages("p", "task-001").await.unwrap() }),
    );
    let left = as_array(left.unwrap());
    let right = as_array(right.unwrap());

    assert_eq!(left.len() + right.len(), 50);
    let contents = |messages: &[Value]| -> Vec<String> {
        messages
            .iter()
            .map(|message| message["content"].as_str().unwrap().to_string())
            .collect()
    };
    let left = contents(&left);
    let right = contents(&right);
    assert!(left.iter().all(|content| !right.contains(content)));
}

#[tokio::test]
async fn projects_never_alias() {
    let service = service();
    register(&service, "alpha", "task-001", "001").await;
    service.add_todo("alpha", "task-001", "a", 1).await.unwrap();
    service
        .announce_file_change("alpha", "task-001", "src/x.ts", "modify", "X")
        .await
        .unwrap();

    let beta_agents = service.list_active_agents("beta").await.unwrap();
    assert!(beta_agents.as_object().unwrap().is_empty());

    let beta_todos = service.get_my_todos("beta", "task-001").await.unwrap();
    assert_eq!(beta_todos["total"], 0);

    // The same path locks independently per project.
    register(&service, "beta", "task-009", "009").await;
    let locked = service
        .announce_file_change("beta", "task-009", "src/x.ts", "modify", "Y")
        .await
        .unwrap();
    assert_eq!(locked["status"], "locked");

    let beta_changes = as_array(service.get_recent_changes("beta", 20).await.unwrap());
    assert_eq!(beta_changes.len(), 1);
    assert_eq!(beta_changes[0]["session_name"], "task-009");
}

#[tokio::test]
async fn interface_round_trip_and_fuzzy_miss() {
    let service = service();
    register(&service, "p", "task-001", "001").await;

    service
        .register_interface(
            "p",
            "task-001",
            "UserProfile",
            "interface UserProfile { id: string }",
            Some("src/types.ts"),
        )
        .await
        .unwrap();

    let found = service.query_interface("p", "UserProfile").await.unwrap();
    assert_eq!(found["status"], "found");
    assert_eq!(found["definition"], "interface UserProfile { id: string }");
    assert_eq!(found["registered_by"], "task-001");

    let missed = service.query_interface("p", "UserProfil").await.unwrap();
    assert_eq!(missed["status"], "not_found");
    assert_eq!(missed["similar"][0], "UserProfile");

    let listed = service.list_interfaces("p").await.unwrap();
    assert!(listed.as_object().unwrap().contains_key("UserProfile"));

    // Interfaces are project-owned: they survive the registering agent.
    service.unregister_agent("p", "task-001").await.unwrap();
    let still_there = service.query_interface("p", "UserProfile").await.unwrap();
    assert_eq!(still_there["status"], "found");
}

#[tokio::test]
async fn mark_task_completed_writes_record_and_marker() {
    let status_dir = tempfile::tempdir().unwrap();
    let config = BrokerConfig {
        status_dir: status_dir.path().to_path_buf(),
        ..test_config()
    };
    let service = service_with(config);
    register(&service, "p", "task-001", "001").await;

    let result = service
        .mark_task_completed("p", "task-001", "001")
        .await
        .unwrap();
    assert_eq!(result["status"], "success");

    let record = service
        .store()
        .get(&keys::completed("p", "001"))
        .await
        .unwrap()
        .expect("completion record written");
    assert!(record.contains("task-001"));

    let marker = std::fs::read_to_string(status_dir.path().join("task-001.status")).unwrap();
    assert_eq!(marker, "COMPLETED\n");

    let agents = service.list_active_agents("p").await.unwrap();
    assert_eq!(agents["task-001"]["status"], "completed");

    // The durable record survives unregistration.
    service.unregister_agent("p", "task-001").await.unwrap();
    assert!(service
        .store()
        .get(&keys::completed("p", "001"))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn recent_changes_limit_zero_is_empty() {
    let service = service();
    register(&service, "p", "task-001", "001").await;
    service
        .announce_file_change("p", "task-001", "src/x.ts", "modify", "X")
        .await
        .unwrap();

    let none = as_array(service.get_recent_changes("p", 0).await.unwrap());
    assert!(none.is_empty());

    let some = as_array(service.get_recent_changes("p", 20).await.unwrap());
    assert_eq!(some.len(), 1);
}

#[tokio::test]
async fn recent_changes_are_newest_first_and_capped() {
    let config = BrokerConfig {
        recent_changes_cap: 3,
        ..test_config()
    };
    let service = service_with(config);
    register(&service, "p", "task-001", "001").await;

    for i in 0..5 {
        service
            .announce_file_change("p", "task-001", &format!("src/f{i}.rs"), "modify", "w")
            .await
            .unwrap();
    }

    let changes = as_array(service.get_recent_changes("p", 20).await.unwrap());
    assert_eq!(changes.len(), 3);
    assert_eq!(changes[0]["file_path"], "src/f4.rs");
    assert_eq!(changes[2]["file_path"], "src/f2.rs");
}

#[tokio::test]
async fn heartbeat_is_idempotent_and_gates_on_registration() {
    let service = service();

    let unknown = service.heartbeat("p", "task-001").await.unwrap();
    assert_eq!(unknown["status"], "not_registered");

    register(&service, "p", "task-001", "001").await;
    for _ in 0..3 {
        let beat = service.heartbeat("p", "task-001").await.unwrap();
        assert_eq!(beat["status"], "ok");
    }
}

#[tokio::test]
async fn broadcast_counts_only_other_active_agents() {
    let service = service();
    register(&service, "p", "task-001", "001").await;
    register(&service, "p", "task-002", "002").await;
    register(&service, "p", "task-003", "003").await;

    let result = service
        .broadcast_message("p", "task-001", "info", "hello")
        .await
        .unwrap();
    assert_eq!(result["status"], "broadcast_sent");
    assert_eq!(result["recipients"], 2);

    // A late joiner does not receive the earlier broadcast.
    register(&service, "p", "task-004", "004").await;
    let inbox = as_array(service.check_messages("p", "task-004").await.unwrap());
    assert!(inbox
        .iter()
        .all(|message| message["content"] != "hello"));
}
