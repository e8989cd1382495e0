use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Current connectivity/availability state of a registered agent.
///
/// Invariant (enforced by `AgentRegistry`, not by this type): a session handle
/// exists for an agent iff its status is not `Disconnected`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Busy,
    Unresponsive,
    Disconnected,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Busy => "busy",
            AgentStatus::Unresponsive => "unresponsive",
            AgentStatus::Disconnected => "disconnected",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(AgentStatus::Idle),
            "busy" => Ok(AgentStatus::Busy),
            "unresponsive" => Ok(AgentStatus::Unresponsive),
            "disconnected" => Ok(AgentStatus::Disconnected),
            other => Err(format!("unknown agent status: {other}")),
        }
    }
}

/// Per-capability performance statistics the router learns from completions.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SpecializationStats {
    pub total: u32,
    pub successful: u32,
    pub success_rate: f64,
    pub avg_duration: f64,
}

/// A completed-task fingerprint used for the router's similar-context bonus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentCompletion {
    pub description: String,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

/// An entry in the coordinator's agent inventory.
///
/// The session handle (the live transport back-reference) deliberately does
/// NOT live on this struct: it is owned by the session manager's own map, so
/// the inventory and the transport layer don't hold cyclic owning references
/// to each other (see DESIGN.md, "Cross-referencing collaborators").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub agent_type: String,
    pub capabilities: HashSet<String>,
    pub status: AgentStatus,
    pub current_load: u32,
    pub max_concurrent_tasks: u32,
    pub total_tasks: u32,
    pub successful_tasks: u32,
    pub failed_tasks: u32,
    pub avg_duration: f64,
    pub specializations: HashMap<String, SpecializationStats>,
    pub recent_completions: Vec<RecentCompletion>,
    pub registered_at: chrono::DateTime<chrono::Utc>,
    pub last_heartbeat: Option<chrono::DateTime<chrono::Utc>>,
    pub last_task_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl Agent {
    pub fn new(
        agent_id: String,
        agent_type: String,
        capabilities: HashSet<String>,
        max_concurrent_tasks: u32,
    ) -> Self {
        Self {
            agent_id,
            agent_type,
            capabilities,
            status: AgentStatus::Idle,
            current_load: 0,
            max_concurrent_tasks,
            total_tasks: 0,
            successful_tasks: 0,
            failed_tasks: 0,
            avg_duration: 0.0,
            specializations: HashMap::new(),
            recent_completions: Vec::new(),
            registered_at: chrono::Utc::now(),
            last_heartbeat: None,
            last_task_time: None,
        }
    }

    pub fn declares_general(&self) -> bool {
        self.capabilities.contains("general")
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability) || self.declares_general()
    }
}

/// Task priority. Only `High` has any scoring effect (the router's speed
/// factor); the others exist purely as a queueing hint callers may use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// Where a task currently sits in the lifecycle state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Assigned,
    Active,
    Completed,
    Failed,
}

/// A unit of work routed to an agent. `task_type` is the capability tag the
/// router matches against (spec calls this field `type`; renamed here to
/// avoid shadowing the Rust keyword-adjacent `type` field name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegated_from: Option<String>,
    pub status: TaskStatus,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Task {
    /// Builds a freshly-submitted task. Callers that don't supply an `id`
    /// should assign one from the lifecycle engine's monotonic counter
    /// before calling this (see `lifecycle::next_task_id`).
    pub fn new(id: String, task_type: String, description: String, priority: Priority) -> Self {
        Self {
            id,
            task_type,
            description,
            priority,
            payload: None,
            estimated_duration: None,
            delegated_from: None,
            status: TaskStatus::Queued,
            enqueued_at: chrono::Utc::now(),
            assigned_at: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Outcome of a completed or failed task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum TaskOutcome {
    Success { result: serde_json::Value },
    Failure { error: String },
}

/// An archived task, persisted via the store adapter once it leaves the
/// active-map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedTaskRecord {
    pub task: Task,
    pub agent_id: String,
    pub duration: f64,
    pub outcome: TaskOutcome,
}

/// One candidate's score in a routing decision, in evaluation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateScore {
    pub agent_id: String,
    pub score: f64,
}

/// Append-only audit record of a single routing decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub task_id: String,
    pub task_type: String,
    pub selected_agent: Option<String>,
    pub candidate_scores: Vec<CandidateScore>,
}

/// A versioned, checksum-verified shared-context entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedContextEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_by: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: u64,
    pub metadata: HashMap<String, serde_json::Value>,
    pub checksum: String,
}

/// A proposed load-reduction action from `TaskRouter::rebalance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceAction {
    pub agent_id: String,
    pub current_load: u32,
    pub recommended_load: u32,
}

/// An improvement hint from `TaskRouter::recommend`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingAdvice {
    pub capability: String,
    pub advice: AdviceKind,
    pub success_rate: f64,
    pub samples: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdviceKind {
    Deprioritize,
    Prefer,
}
