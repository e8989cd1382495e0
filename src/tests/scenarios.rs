//! The named end-to-end scenarios, each composing the registry, router,
//! lifecycle engine and dashboard exactly the way `Coordinator::new` does,
//! rather than exercising any one of them in isolation.

use crate::coordinator::agent_registry::AgentRegistry;
use crate::coordinator::lifecycle::LifecycleEngine;
use crate::dashboard::DashboardPublisher;
use crate::models::{Priority, TaskStatus};
use crate::persistence::InMemoryTaskRepository;
use crate::router::TaskRouter;
use std::collections::HashSet;

fn wire() -> (AgentRegistry, LifecycleEngine) {
    let registry = AgentRegistry::new();
    let router = TaskRouter::new(registry.clone());
    let engine = LifecycleEngine::new(router, InMemoryTaskRepository::new(100), DashboardPublisher::new());
    (registry, engine)
}

fn caps(tags: &[&str]) -> HashSet<String> {
    tags.iter().map(|s| s.to_string()).collect()
}

/// Register A with {shell_commands, general}; submit a shell_commands task;
/// A requests work, executes it (simulated by the caller), reports completion.
/// Expected per the "happy path" scenario: the task lands in the completed
/// log and the router's counters for A read total=1, successful=1.
#[tokio::test]
async fn happy_path_completion_updates_router_counters() {
    let (registry, engine) = wire();
    registry
        .register("A", "cli", caps(&["shell_commands", "general"]), 5)
        .await;

    engine
        .submit(
            "shell_commands".to_string(),
            "echo hi".to_string(),
            Priority::Normal,
            Some(serde_json::json!({"command": "echo hi"})),
            None,
        )
        .await
        .unwrap();

    let assigned = engine.request_task("A").await.unwrap().unwrap();
    assert_eq!(assigned.status, TaskStatus::Assigned);

    engine
        .handle_task_complete(
            "A",
            &assigned.id,
            serde_json::json!({"code": 0, "stdout": "hi\n", "stderr": ""}),
        )
        .await;

    let agent = registry.get("A").await.unwrap();
    assert_eq!(agent.total_tasks, 1);
    assert_eq!(agent.successful_tasks, 1);
    assert_eq!(engine.active_count().await, 0);
    assert_eq!(engine.recent_completed(10).await.len(), 1);
}

/// Register A with only `code_generation`; submit a task requiring
/// `image_processing`. No agent qualifies, so the task is requeued and no
/// assignment is ever sent.
#[tokio::test]
async fn no_eligible_agent_leaves_task_queued() {
    let (registry, engine) = wire();
    registry.register("A", "cli", caps(&["code_generation"]), 5).await;

    engine
        .submit(
            "image_processing".to_string(),
            "resize a photo".to_string(),
            Priority::Normal,
            None,
            None,
        )
        .await
        .unwrap();

    let assigned = engine.request_task("A").await.unwrap();
    assert!(assigned.is_none());
    assert_eq!(engine.queue_depth().await, 1);
    assert_eq!(engine.active_count().await, 0);
}

/// Two agents with identical capabilities and zero counters: the first task
/// goes to the lexicographically smaller id; once that agent carries load,
/// the next task in the same cycle goes to the other one instead.
#[tokio::test]
async fn tie_break_then_load_penalty_alternates_agents() {
    let (registry, engine) = wire();
    registry.register("b_agent", "cli", caps(&["general"]), 5).await;
    registry.register("a_agent", "cli", caps(&["general"]), 5).await;

    engine
        .submit("general".to_string(), "first".to_string(), Priority::Normal, None, None)
        .await
        .unwrap();
    let first = engine.request_task("nobody").await.unwrap().unwrap();
    assert_eq!(
        registry
            .snapshot()
            .await
            .iter()
            .find(|a| a.current_load > 0)
            .unwrap()
            .agent_id,
        "a_agent"
    );

    engine
        .submit("general".to_string(), "second".to_string(), Priority::Normal, None, None)
        .await
        .unwrap();
    let second = engine.request_task("nobody").await.unwrap().unwrap();

    assert_ne!(first.id, second.id);
    let active = registry.snapshot().await;
    let a_load = active.iter().find(|a| a.agent_id == "a_agent").unwrap().current_load;
    let b_load = active.iter().find(|a| a.agent_id == "b_agent").unwrap().current_load;
    assert_eq!(a_load, 1);
    assert_eq!(b_load, 1);
}

/// A is assigned a task, then its stream drops before completion: the task
/// stays abandoned in the active-map (no durability promised across a
/// disconnect) while A's status flips to disconnected; on re-registering,
/// status returns to idle and counters survive untouched.
#[tokio::test]
async fn disconnect_then_reconnect_preserves_counters_and_abandons_active_task() {
    let (registry, engine) = wire();
    registry.register("A", "cli", caps(&["general"]), 5).await;

    engine
        .submit("general".to_string(), "d".to_string(), Priority::Normal, None, None)
        .await
        .unwrap();
    let assigned = engine.request_task("A").await.unwrap().unwrap();
    assert_eq!(engine.active_count().await, 1);

    registry.mark_disconnected("A").await;
    let disconnected = registry.get("A").await.unwrap();
    assert_eq!(disconnected.status, crate::models::AgentStatus::Disconnected);
    // The abandoned task is still parked in the active-map; no durability
    // is promised across a disconnect.
    assert_eq!(engine.active_count().await, 1);
    assert!(engine.recent_completed(10).await.is_empty());

    registry.register("A", "cli", caps(&["general"]), 5).await;
    let reconnected = registry.get("A").await.unwrap();
    assert_eq!(reconnected.status, crate::models::AgentStatus::Idle);
    assert_eq!(reconnected.total_tasks, 0);

    // The orphaned task can still be completed later; the assignee id on the
    // frame is trusted once the active-map entry is found by task_id.
    engine
        .handle_task_complete("A", &assigned.id, serde_json::json!({"ok": true}))
        .await;
    assert_eq!(engine.recent_completed(10).await.len(), 1);
}
