use crate::constants::SIMILAR_CONTEXT_WINDOW_SECS;
use crate::models::{Agent, AgentStatus, RecentCompletion, SpecializationStats};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 🏗️ ARCHITECTURE DECISION: single owning partition for the agent inventory
/// Why: the inventory must be mutated under one discipline with no two
/// concurrent writers. An `RwLock<HashMap<..>>` behind one `Arc` gives every
/// caller (session manager, router, lifecycle engine) the same single-writer
/// view without routing every mutation through a channel actor.
/// Alternative: message-passing actor (rejected here as unnecessary ceremony
/// for a single in-process map; revisit if cross-process sharding is added).
#[derive(Clone)]
pub struct AgentRegistry {
    agents: Arc<RwLock<HashMap<String, Agent>>>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers an agent. Idempotent: re-registering an existing `agent_id`
    /// replaces its capability set and session status but preserves counters.
    pub async fn register(
        &self,
        agent_id: &str,
        agent_type: &str,
        capabilities: HashSet<String>,
        max_concurrent_tasks: u32,
    ) -> Agent {
        let mut agents = self.agents.write().await;
        match agents.get_mut(agent_id) {
            Some(existing) => {
                existing.agent_type = agent_type.to_string();
                existing.capabilities = capabilities;
                existing.max_concurrent_tasks = max_concurrent_tasks;
                existing.status = AgentStatus::Idle;
                info!(agent_id, "re-registered agent, counters preserved");
                existing.clone()
            }
            None => {
                let agent = Agent::new(
                    agent_id.to_string(),
                    agent_type.to_string(),
                    capabilities,
                    max_concurrent_tasks,
                );
                agents.insert(agent_id.to_string(), agent.clone());
                info!(agent_id, "registered new agent");
                agent
            }
        }
    }

    pub async fn get(&self, agent_id: &str) -> Option<Agent> {
        self.agents.read().await.get(agent_id).cloned()
    }

    pub async fn snapshot(&self) -> Vec<Agent> {
        self.agents.read().await.values().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn mark_disconnected(&self, agent_id: &str) {
        if let Some(agent) = self.agents.write().await.get_mut(agent_id) {
            agent.status = AgentStatus::Disconnected;
            debug!(agent_id, "marked disconnected");
        }
    }

    pub async fn record_heartbeat(&self, agent_id: &str, status: AgentStatus) -> bool {
        let mut agents = self.agents.write().await;
        match agents.get_mut(agent_id) {
            Some(agent) => {
                agent.last_heartbeat = Some(chrono::Utc::now());
                agent.status = status;
                true
            }
            None => false,
        }
    }

    /// Sweeps for agents whose last heartbeat is older than `threshold_secs`
    /// and flips them to `Unresponsive`. An agent that never sent a
    /// heartbeat is left alone.
    pub async fn sweep_unresponsive(&self, threshold_secs: i64) -> Vec<String> {
        let now = chrono::Utc::now();
        let mut flagged = Vec::new();
        let mut agents = self.agents.write().await;
        for agent in agents.values_mut() {
            if agent.status == AgentStatus::Disconnected {
                continue;
            }
            if let Some(last) = agent.last_heartbeat {
                if (now - last).num_seconds() > threshold_secs {
                    agent.status = AgentStatus::Unresponsive;
                    flagged.push(agent.agent_id.clone());
                }
            }
        }
        if !flagged.is_empty() {
            warn!(count = flagged.len(), "agents marked unresponsive");
        }
        flagged
    }

    pub async fn increment_load(&self, agent_id: &str) {
        if let Some(agent) = self.agents.write().await.get_mut(agent_id) {
            agent.current_load += 1;
            agent.status = AgentStatus::Busy;
        }
    }

    /// Applies a task completion to the agent's rolling counters and
    /// specialization statistics.
    pub async fn apply_completion(
        &self,
        agent_id: &str,
        task_type: &str,
        description: &str,
        success: bool,
        duration: f64,
    ) {
        let mut agents = self.agents.write().await;
        let Some(agent) = agents.get_mut(agent_id) else {
            warn!(agent_id, "report_completion for unknown agent, ignored");
            return;
        };

        agent.total_tasks += 1;
        if success {
            agent.successful_tasks += 1;
        } else {
            agent.failed_tasks += 1;
        }
        agent.current_load = agent.current_load.saturating_sub(1);
        agent.last_task_time = Some(chrono::Utc::now());

        agent.avg_duration = roll(agent.avg_duration, duration);

        let spec = agent
            .specializations
            .entry(task_type.to_string())
            .or_insert_with(SpecializationStats::default);
        spec.total += 1;
        if success {
            spec.successful += 1;
        }
        spec.success_rate = spec.successful as f64 / spec.total as f64;
        spec.avg_duration = roll(spec.avg_duration, duration);

        agent.recent_completions.push(RecentCompletion {
            description: description.to_string(),
            completed_at: chrono::Utc::now(),
        });
        let cutoff = chrono::Utc::now() - chrono::Duration::seconds(SIMILAR_CONTEXT_WINDOW_SECS);
        agent.recent_completions.retain(|c| c.completed_at >= cutoff);

        if agent.current_load == 0 {
            agent.status = AgentStatus::Idle;
        }
    }
}

fn roll(old: f64, sample: f64) -> f64 {
    use crate::constants::{ROLLING_AVG_OLD_WEIGHT, ROLLING_AVG_SAMPLE_WEIGHT};
    if old == 0.0 {
        sample
    } else {
        ROLLING_AVG_OLD_WEIGHT * old + ROLLING_AVG_SAMPLE_WEIGHT * sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_is_idempotent_and_preserves_counters() {
        let registry = AgentRegistry::new();
        let caps: HashSet<String> = ["general".to_string()].into_iter().collect();
        registry.register("a1", "cli", caps.clone(), 5).await;
        registry
            .apply_completion("a1", "shell_commands", "d", true, 1.0)
            .await;
        registry.register("a1", "cli", caps, 5).await;

        let agent = registry.get("a1").await.unwrap();
        assert_eq!(agent.total_tasks, 1);
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn sweep_unresponsive_leaves_agent_with_no_heartbeat_alone() {
        let registry = AgentRegistry::new();
        registry.register("a1", "cli", HashSet::new(), 5).await;
        let flagged = registry.sweep_unresponsive(60).await;
        assert!(flagged.is_empty());
        assert_eq!(registry.get("a1").await.unwrap().status, AgentStatus::Idle);
    }

    #[tokio::test]
    async fn sweep_unresponsive_flags_stale_heartbeat() {
        let registry = AgentRegistry::new();
        registry.register("a1", "cli", HashSet::new(), 5).await;
        if let Some(agent) = registry.agents.write().await.get_mut("a1") {
            agent.last_heartbeat = Some(chrono::Utc::now() - chrono::Duration::seconds(120));
        }
        let flagged = registry.sweep_unresponsive(60).await;
        assert_eq!(flagged, vec!["a1".to_string()]);
        assert_eq!(registry.get("a1").await.unwrap().status, AgentStatus::Unresponsive);
    }

    #[tokio::test]
    async fn completion_for_unknown_agent_is_a_no_op() {
        let registry = AgentRegistry::new();
        registry
            .apply_completion("ghost", "shell_commands", "d", true, 1.0)
            .await;
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn rolling_average_uses_sample_on_first_completion() {
        let registry = AgentRegistry::new();
        registry
            .register("a1", "cli", HashSet::new(), 5)
            .await;
        registry
            .apply_completion("a1", "general", "d", true, 4.0)
            .await;
        let agent = registry.get("a1").await.unwrap();
        assert_eq!(agent.avg_duration, 4.0);
    }
}
