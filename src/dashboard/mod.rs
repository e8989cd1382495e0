//! Dashboard publisher. Keeps its own denormalized view of agents, the
//! pending queue, recently completed tasks and active collaborations,
//! updated by domain events pushed from the coordinator's lifecycle engine
//! and session manager, plus the separate report-ingestion path. These two
//! update paths are kept disjoint on purpose: ingestion events only ever
//! touch this module's own view.

pub mod http;

use crate::constants::DASHBOARD_RECENT_COMPLETED;
use crate::models::{Agent, CompletedTaskRecord, Task};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum DashboardEvent {
    #[serde(rename = "agent_update")]
    AgentUpdate { agent_id: String, status: serde_json::Value },
    #[serde(rename = "new_task")]
    NewTask { task: Task },
    #[serde(rename = "task_complete")]
    TaskComplete { task_id: String, result: serde_json::Value },
    #[serde(rename = "collaboration")]
    Collaboration { from: String, to: String, description: String },
    #[serde(rename = "work_available")]
    WorkAvailable { agent_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collaboration {
    pub from: String,
    pub to: String,
    pub description: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub total_agents: usize,
    pub active_agents: usize,
    pub tasks_in_queue: usize,
    pub tasks_completed: usize,
    pub active_collaborations: usize,
    pub avg_task_duration: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub agents: HashMap<String, serde_json::Value>,
    pub queue: Vec<Task>,
    pub recent_completed: Vec<CompletedTaskRecord>,
    pub metrics: DashboardMetrics,
}

struct DashboardState {
    agents: HashMap<String, serde_json::Value>,
    queue: Vec<Task>,
    completed: VecDeque<CompletedTaskRecord>,
    collaborations: Vec<Collaboration>,
}

#[derive(Clone)]
pub struct DashboardPublisher {
    state: Arc<RwLock<DashboardState>>,
    events: broadcast::Sender<DashboardEvent>,
}

impl Default for DashboardPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl DashboardPublisher {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            state: Arc::new(RwLock::new(DashboardState {
                agents: HashMap::new(),
                queue: Vec::new(),
                completed: VecDeque::new(),
                collaborations: Vec::new(),
            })),
            events: tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: DashboardEvent) {
        // A subscriber-less broadcast or a lagging receiver both just drop
        // the send; delivery here is inherently best-effort, matching the
        // session broadcast's "swallow send failures" posture.
        let _ = self.events.send(event);
    }

    pub async fn update_agent_status(&self, agent_id: &str, status: serde_json::Value) {
        let mut state = self.state.write().await;
        state.agents.insert(agent_id.to_string(), status.clone());
        drop(state);
        self.publish(DashboardEvent::AgentUpdate {
            agent_id: agent_id.to_string(),
            status,
        });
    }

    pub async fn add_task(&self, task: Task) {
        let mut state = self.state.write().await;
        state.queue.push(task.clone());
        drop(state);
        self.publish(DashboardEvent::NewTask { task });
    }

    pub async fn start_task(&self, task_id: &str) {
        let mut state = self.state.write().await;
        state.queue.retain(|t| t.id != task_id);
    }

    pub async fn complete_task(&self, record: CompletedTaskRecord) {
        let task_id = record.task.id.clone();
        let result = match &record.outcome {
            crate::models::TaskOutcome::Success { result } => result.clone(),
            crate::models::TaskOutcome::Failure { error } => serde_json::json!({"error": error}),
        };
        let mut state = self.state.write().await;
        state.queue.retain(|t| t.id != task_id);
        state.completed.push_back(record);
        while state.completed.len() > DASHBOARD_RECENT_COMPLETED * 4 {
            state.completed.pop_front();
        }
        drop(state);
        self.publish(DashboardEvent::TaskComplete { task_id, result });
    }

    pub async fn report_collaboration(&self, from: &str, to: &str, description: &str) {
        let collab = Collaboration {
            from: from.to_string(),
            to: to.to_string(),
            description: description.to_string(),
            timestamp: chrono::Utc::now(),
        };
        self.state.write().await.collaborations.push(collab);
        self.publish(DashboardEvent::Collaboration {
            from: from.to_string(),
            to: to.to_string(),
            description: description.to_string(),
        });
    }

    pub async fn report_work_available(&self, agent_id: &str) {
        self.publish(DashboardEvent::WorkAvailable {
            agent_id: agent_id.to_string(),
        });
    }

    async fn metrics(&self) -> DashboardMetrics {
        let state = self.state.read().await;
        let active_agents = state
            .agents
            .values()
            .filter(|v| v.get("status").and_then(|s| s.as_str()) == Some("busy"))
            .count();
        let durations: Vec<f64> = state
            .completed
            .iter()
            .map(|r| r.duration)
            .collect();
        let avg_task_duration = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };
        DashboardMetrics {
            total_agents: state.agents.len(),
            active_agents,
            tasks_in_queue: state.queue.len(),
            tasks_completed: state.completed.len(),
            active_collaborations: state.collaborations.len(),
            avg_task_duration,
        }
    }

    pub async fn snapshot(&self) -> DashboardSnapshot {
        let metrics = self.metrics().await;
        let state = self.state.read().await;
        DashboardSnapshot {
            agents: state.agents.clone(),
            queue: state.queue.clone(),
            recent_completed: state
                .completed
                .iter()
                .rev()
                .take(DASHBOARD_RECENT_COMPLETED)
                .cloned()
                .collect(),
            metrics,
        }
    }

    /// Seeds the agents view from the authoritative registry. Called once
    /// at startup and whenever the coordinator wants to reconcile a drifted
    /// dashboard view (the two stores are independent).
    pub async fn reconcile_agents(&self, agents: &[Agent]) {
        let mut state = self.state.write().await;
        for agent in agents {
            state.agents.insert(
                agent.agent_id.clone(),
                serde_json::json!({
                    "status": agent.status.to_string(),
                    "current_load": agent.current_load,
                    "capabilities": agent.capabilities,
                }),
            );
        }
    }

    /// Dashboard report ingestion: a disjoint path that only ever mutates
    /// this module's own view, never the lifecycle engine.
    pub async fn process_report(&self, report: ReportEvent) {
        match report {
            ReportEvent::TaskStart { agent_id, task } => {
                self.update_agent_status(
                    &agent_id,
                    serde_json::json!({"status": "busy", "current_task": task}),
                )
                .await;
            }
            ReportEvent::TaskProgress { agent_id, progress } => {
                let mut state = self.state.write().await;
                if let Some(status) = state.agents.get_mut(&agent_id) {
                    if let Some(obj) = status.as_object_mut() {
                        obj.insert("progress".to_string(), progress);
                    }
                }
            }
            ReportEvent::TaskComplete { agent_id, .. } | ReportEvent::TaskError { agent_id, .. } => {
                self.update_agent_status(
                    &agent_id,
                    serde_json::json!({"status": "idle", "current_task": null}),
                )
                .await;
            }
            ReportEvent::CollaborationRequest {
                agent_id,
                target_agent,
                description,
            } => {
                self.report_collaboration(&agent_id, &target_agent, &description)
                    .await;
            }
            ReportEvent::IdleRequest { agent_id } => {
                self.update_agent_status(
                    &agent_id,
                    serde_json::json!({"status": "idle", "requesting_work": true}),
                )
                .await;
                self.report_work_available(&agent_id).await;
            }
        }
    }
}

/// Event vocabulary accepted by the dashboard report-ingestion HTTP
/// endpoint. `agent_id` plus `event` dispatch to one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ReportEvent {
    #[serde(rename = "TASK_START")]
    TaskStart {
        agent_id: String,
        task_id: String,
        task: serde_json::Value,
    },
    #[serde(rename = "TASK_PROGRESS")]
    TaskProgress {
        agent_id: String,
        progress: serde_json::Value,
    },
    #[serde(rename = "TASK_COMPLETE")]
    TaskComplete {
        agent_id: String,
        #[serde(default)]
        result: serde_json::Value,
    },
    #[serde(rename = "TASK_ERROR")]
    TaskError {
        agent_id: String,
        #[serde(default)]
        error: String,
    },
    #[serde(rename = "COLLABORATION_REQUEST")]
    CollaborationRequest {
        agent_id: String,
        target_agent: String,
        description: String,
    },
    #[serde(rename = "IDLE_REQUEST")]
    IdleRequest { agent_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_reflects_queue_and_metrics() {
        let dashboard = DashboardPublisher::new();
        let task = Task::new(
            "t1".to_string(),
            "general".to_string(),
            "d".to_string(),
            crate::models::Priority::Normal,
        );
        dashboard.add_task(task).await;
        let snap = dashboard.snapshot().await;
        assert_eq!(snap.queue.len(), 1);
        assert_eq!(snap.metrics.tasks_in_queue, 1);
    }

    #[tokio::test]
    async fn ingestion_path_never_touches_queue() {
        let dashboard = DashboardPublisher::new();
        dashboard
            .process_report(ReportEvent::TaskStart {
                agent_id: "a1".to_string(),
                task_id: "t1".to_string(),
                task: serde_json::json!({}),
            })
            .await;
        let snap = dashboard.snapshot().await;
        assert_eq!(snap.queue.len(), 0);
        assert_eq!(snap.agents.len(), 1);
    }
}
