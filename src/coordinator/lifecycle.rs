//! Task lifecycle engine: the FIFO queue, the active-task map and the
//! bounded completed-task log, plus the state transitions between them.

use crate::constants::MAX_COMPLETED_LOG;
use crate::dashboard::DashboardPublisher;
use crate::models::{AgentStatus, CompletedTaskRecord, Priority, Task, TaskOutcome, TaskStatus};
use crate::persistence::TaskRepository;
use crate::router::TaskRouter;
use crate::telemetry::Telemetry;
use crate::{CoordinatorError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

struct ActiveEntry {
    task: Task,
    agent_id: String,
}

struct LifecycleState {
    queue: VecDeque<Task>,
    active: HashMap<String, ActiveEntry>,
    completed: VecDeque<CompletedTaskRecord>,
}

/// Owns the single critical section covering queue/active/completed-log
/// transitions. The three pieces only ever change together (a task moves
/// queue -> active -> completed as one step), so one `Mutex` is simpler and
/// has no lock-ordering hazard to document than splitting them further.
pub struct LifecycleEngine {
    state: Mutex<LifecycleState>,
    next_id: AtomicU64,
    /// Cumulative count of tasks that have finished (success or failure),
    /// independent of the bounded `completed` log: `SYSTEM_STATUS_UPDATE`'s
    /// `completed_tasks` field needs a true running total, not the size of
    /// the last-50-entries window the dashboard keeps for display.
    completed_total: AtomicU64,
    router: TaskRouter,
    repository: Arc<dyn TaskRepository>,
    dashboard: DashboardPublisher,
    telemetry: Telemetry,
    max_queue_size: usize,
}

impl LifecycleEngine {
    pub fn new(
        router: TaskRouter,
        repository: Arc<dyn TaskRepository>,
        dashboard: DashboardPublisher,
    ) -> Self {
        Self::with_config(
            router,
            repository,
            dashboard,
            Telemetry::new(),
            crate::constants::MAX_QUEUE_SIZE,
        )
    }

    pub fn with_config(
        router: TaskRouter,
        repository: Arc<dyn TaskRepository>,
        dashboard: DashboardPublisher,
        telemetry: Telemetry,
        max_queue_size: usize,
    ) -> Self {
        Self {
            state: Mutex::new(LifecycleState {
                queue: VecDeque::new(),
                active: HashMap::new(),
                completed: VecDeque::new(),
            }),
            next_id: AtomicU64::new(1),
            completed_total: AtomicU64::new(0),
            router,
            repository,
            dashboard,
            telemetry,
            max_queue_size,
        }
    }

    fn next_task_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("task_{n}")
    }

    /// Enqueues a new task, rejecting it once the queue is at capacity.
    pub async fn submit(
        &self,
        task_type: String,
        description: String,
        priority: Priority,
        payload: Option<serde_json::Value>,
        estimated_duration: Option<f64>,
    ) -> Result<Task> {
        let mut state = self.state.lock().await;
        if state.queue.len() >= self.max_queue_size {
            return Err(CoordinatorError::QueueFull {
                capacity: self.max_queue_size,
            });
        }
        let mut task = Task::new(self.next_task_id(), task_type, description, priority);
        task.payload = payload;
        task.estimated_duration = estimated_duration;
        state.queue.push_back(task.clone());
        drop(state);

        self.dashboard.add_task(task.clone()).await;
        info!(task_id = %task.id, task_type = %task.task_type, "task submitted");
        Ok(task)
    }

    /// Pulls the task at the front of the queue and routes it, preferring
    /// `requesting_agent_id` when it alone is eligible. On routing failure
    /// the task is requeued at the tail with no penalty so it gets another
    /// chance once more agents become eligible.
    pub async fn request_task(&self, requesting_agent_id: &str) -> Result<Option<Task>> {
        let front = {
            let mut state = self.state.lock().await;
            state.queue.pop_front()
        };
        let Some(mut task) = front else {
            return Ok(None);
        };

        let routed = self
            .router
            .route_preferring(&task, requesting_agent_id)
            .await;

        match routed {
            Ok(agent_id) => {
                task.status = TaskStatus::Assigned;
                task.assigned_at = Some(chrono::Utc::now());
                let mut state = self.state.lock().await;
                state.active.insert(
                    task.id.clone(),
                    ActiveEntry {
                        task: task.clone(),
                        agent_id: agent_id.clone(),
                    },
                );
                drop(state);
                self.dashboard.start_task(&task.id).await;
                info!(task_id = %task.id, agent_id, "task assigned");
                Ok(Some(task))
            }
            Err(CoordinatorError::NoEligibleAgent { .. }) => {
                let mut state = self.state.lock().await;
                state.queue.push_back(task);
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }

    async fn finish(&self, agent_id: &str, task_id: &str, outcome: TaskOutcome) {
        let entry = {
            let mut state = self.state.lock().await;
            state.active.remove(task_id)
        };
        let Some(entry) = entry else {
            warn!(task_id, agent_id, "completion for unknown or already-finished task, dropped");
            return;
        };
        if entry.agent_id != agent_id {
            warn!(
                task_id,
                reported_by = agent_id,
                assigned_to = entry.agent_id,
                "completion reported by an agent other than the assignee, accepting anyway"
            );
        }

        let mut task = entry.task;
        let now = chrono::Utc::now();
        task.completed_at = Some(now);
        let success = matches!(outcome, TaskOutcome::Success { .. });
        task.status = if success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };

        let started = task.started_at.or(task.assigned_at).unwrap_or(task.enqueued_at);
        let duration = (now - started).num_milliseconds() as f64 / 1000.0;

        self.router
            .report_completion(&entry.agent_id, &task, success, duration.max(0.0))
            .await;

        let record = CompletedTaskRecord {
            task,
            agent_id: entry.agent_id,
            duration: duration.max(0.0),
            outcome,
        };
        self.repository.record_completed(record.clone()).await;
        self.completed_total.fetch_add(1, Ordering::SeqCst);

        {
            let mut state = self.state.lock().await;
            state.completed.push_back(record.clone());
            while state.completed.len() > MAX_COMPLETED_LOG {
                state.completed.pop_front();
            }
        }

        self.telemetry
            .record_metric(&format!("task.duration.{}", record.task.task_type), record.duration)
            .await;
        self.telemetry
            .record_metric(if success { "task.completed" } else { "task.failed" }, 1.0)
            .await;

        self.dashboard.complete_task(record).await;
    }

    /// Cross-checks `task_id` against the active-map before accepting a
    /// completion; an id not currently active (already completed, or never
    /// assigned) is silently dropped rather than erroring. The active-map
    /// is authoritative, not the agent's say-so.
    pub async fn handle_task_complete(&self, agent_id: &str, task_id: &str, result: serde_json::Value) {
        self.finish(agent_id, task_id, TaskOutcome::Success { result }).await;
    }

    pub async fn handle_task_error(&self, agent_id: &str, task_id: &str, error: String) {
        self.finish(agent_id, task_id, TaskOutcome::Failure { error }).await;
    }

    /// Peer-to-peer delegation. The delegated task gets a
    /// derived id (`<parent>_del`) and, when `to` is currently idle, is
    /// dispatched to it directly, bypassing the router entirely, since the
    /// delegating agent has already made the placement decision. When `to` is
    /// not idle the task is enqueued like any other submission instead, so it
    /// still reaches the router on a future `TASK_REQUEST`.
    pub async fn handle_delegation(
        &self,
        from: &str,
        to: &str,
        task_type: String,
        description: String,
    ) -> Task {
        let parent_id = self.next_task_id();
        let id = format!("{parent_id}_del");
        let mut task = Task::new(id, task_type, description, Priority::Normal);
        task.delegated_from = Some(from.to_string());

        let to_is_idle = self
            .router
            .agent_status(to)
            .await
            .is_some_and(|status| status == AgentStatus::Idle);

        if !to_is_idle {
            let mut state = self.state.lock().await;
            state.queue.push_back(task.clone());
            drop(state);
            self.dashboard.add_task(task.clone()).await;
            info!(task_id = %task.id, from, to, "delegation target not idle, enqueued instead");
            return task;
        }

        task.status = TaskStatus::Assigned;
        task.assigned_at = Some(chrono::Utc::now());
        self.router.increment_load_for_delegation(to).await;

        let mut state = self.state.lock().await;
        state.active.insert(
            task.id.clone(),
            ActiveEntry {
                task: task.clone(),
                agent_id: to.to_string(),
            },
        );
        drop(state);

        self.dashboard.report_collaboration(from, to, &task.description).await;
        info!(task_id = %task.id, from, to, "task delegated");
        task
    }

    pub async fn queue_depth(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn active_count(&self) -> usize {
        self.state.lock().await.active.len()
    }

    /// Cumulative count of tasks finished (success or failure) since
    /// startup, unaffected by the bounded `completed` log's eviction.
    pub fn completed_total(&self) -> u64 {
        self.completed_total.load(Ordering::SeqCst)
    }

    pub async fn recent_completed(&self, limit: usize) -> Vec<CompletedTaskRecord> {
        let state = self.state.lock().await;
        state.completed.iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::agent_registry::AgentRegistry;
    use crate::persistence::InMemoryTaskRepository;

    fn engine() -> LifecycleEngine {
        let registry = AgentRegistry::new();
        let router = TaskRouter::new(registry);
        LifecycleEngine::new(router, InMemoryTaskRepository::new(100), DashboardPublisher::new())
    }

    #[tokio::test]
    async fn submit_then_request_with_no_agents_requeues() {
        let engine = engine();
        engine
            .submit("general".to_string(), "d".to_string(), Priority::Normal, None, None)
            .await
            .unwrap();
        let assigned = engine.request_task("nobody").await.unwrap();
        assert!(assigned.is_none());
        assert_eq!(engine.queue_depth().await, 1);
    }

    #[tokio::test]
    async fn requesting_agent_is_preferred_when_eligible() {
        let registry = AgentRegistry::new();
        registry
            .register("a1", "cli", ["general".to_string()].into_iter().collect(), 5)
            .await;
        let router = TaskRouter::new(registry);
        let engine = LifecycleEngine::new(router, InMemoryTaskRepository::new(100), DashboardPublisher::new());

        engine
            .submit("general".to_string(), "d".to_string(), Priority::Normal, None, None)
            .await
            .unwrap();
        let assigned = engine.request_task("a1").await.unwrap().unwrap();
        assert_eq!(engine.active_count().await, 1);
        assert_eq!(assigned.status, TaskStatus::Assigned);
    }

    #[tokio::test]
    async fn completion_for_unknown_task_id_is_dropped() {
        let engine = engine();
        engine.handle_task_complete("a1", "task_999", serde_json::json!({})).await;
        assert_eq!(engine.active_count().await, 0);
    }

    #[tokio::test]
    async fn delegation_bypasses_router_and_activates_immediately_when_target_idle() {
        let registry = AgentRegistry::new();
        registry
            .register("a2", "cli", ["general".to_string()].into_iter().collect(), 5)
            .await;
        let router = TaskRouter::new(registry);
        let engine = LifecycleEngine::new(router, InMemoryTaskRepository::new(100), DashboardPublisher::new());

        let task = engine
            .handle_delegation("a1", "a2", "general".to_string(), "help me".to_string())
            .await;
        assert!(task.id.ends_with("_del"));
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(engine.active_count().await, 1);
    }

    #[tokio::test]
    async fn delegation_enqueues_when_target_is_not_idle() {
        let engine = engine();
        let task = engine
            .handle_delegation("a1", "a2", "general".to_string(), "help me".to_string())
            .await;
        assert!(task.id.ends_with("_del"));
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(engine.active_count().await, 0);
        assert_eq!(engine.queue_depth().await, 1);
    }

    #[tokio::test]
    async fn full_round_trip_moves_task_to_completed_log() {
        let registry = AgentRegistry::new();
        registry
            .register("a1", "cli", ["general".to_string()].into_iter().collect(), 5)
            .await;
        let router = TaskRouter::new(registry);
        let engine = LifecycleEngine::new(router, InMemoryTaskRepository::new(100), DashboardPublisher::new());

        engine
            .submit("general".to_string(), "d".to_string(), Priority::Normal, None, None)
            .await
            .unwrap();
        let task = engine.request_task("a1").await.unwrap().unwrap();
        engine
            .handle_task_complete("a1", &task.id, serde_json::json!({"ok": true}))
            .await;
        assert_eq!(engine.active_count().await, 0);
        let recent = engine.recent_completed(10).await;
        assert_eq!(recent.len(), 1);
    }
}
