//! Capability-aware task router. Scores eligible agents with a weighted
//! multi-factor formula and records every decision for later explainability
//! via `recommend`.

use crate::constants::*;
use crate::coordinator::agent_registry::AgentRegistry;
use crate::models::{
    AdviceKind, Agent, AgentStatus, CandidateScore, Priority, RebalanceAction, RoutingAdvice,
    RoutingDecision, Task,
};
use crate::telemetry::Telemetry;
use crate::{CoordinatorError, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Clone)]
pub struct TaskRouter {
    registry: AgentRegistry,
    decisions: Arc<Mutex<Vec<RoutingDecision>>>,
    telemetry: Telemetry,
}

impl TaskRouter {
    pub fn new(registry: AgentRegistry) -> Self {
        Self {
            registry,
            decisions: Arc::new(Mutex::new(Vec::new())),
            telemetry: Telemetry::new(),
        }
    }

    /// Attaches a shared telemetry handle (the coordinator's own instance,
    /// so routing-latency samples land in the same metric space as the
    /// lifecycle engine's task-duration samples). Builder-style so existing
    /// `TaskRouter::new` call sites (tests, mainly) are unaffected.
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Idempotent registration, delegated straight to the shared inventory.
    pub async fn register(
        &self,
        agent_id: &str,
        agent_type: &str,
        capabilities: HashSet<String>,
        max_concurrent_tasks: u32,
    ) -> Agent {
        self.registry
            .register(agent_id, agent_type, capabilities, max_concurrent_tasks)
            .await
    }

    /// Looks up an agent's current status, for callers that need a cheap
    /// eligibility-adjacent check without a full routing decision (e.g.
    /// delegation's "dispatch only if `to` is idle").
    pub async fn agent_status(&self, agent_id: &str) -> Option<AgentStatus> {
        self.registry.get(agent_id).await.map(|a| a.status)
    }

    /// Bumps `current_load` for a direct (router-bypassing) delegation
    /// dispatch, so the registry's load bookkeeping stays accurate even
    /// though this placement never went through `route`/`route_preferring`.
    pub async fn increment_load_for_delegation(&self, agent_id: &str) {
        self.registry.increment_load(agent_id).await;
    }

    fn is_eligible(agent: &Agent, task_type: &str) -> bool {
        let connected = agent.status != AgentStatus::Disconnected;
        let load_ok = agent.status == AgentStatus::Idle || agent.current_load < ELIGIBLE_LOAD_CEILING;
        let capable = agent.has_capability(task_type);
        connected && load_ok && capable
    }

    fn score(agent: &Agent, task: &Task, now: chrono::DateTime<chrono::Utc>) -> f64 {
        let mut score = SCORE_BASE;

        // 1. Specialization.
        if let Some(spec) = agent.specializations.get(&task.task_type) {
            score += spec.success_rate * WEIGHT_SPECIALIZATION;
        } else if agent.capabilities.contains(&task.task_type) {
            score += SPECIALIZATION_CAPABILITY_ONLY_BONUS;
        }

        // 2. Load penalty.
        score -= agent.current_load as f64 * LOAD_PENALTY_PER_TASK;

        // 3. Historical success.
        if agent.total_tasks > 0 {
            score += (agent.successful_tasks as f64 / agent.total_tasks as f64)
                * WEIGHT_HISTORICAL_SUCCESS;
        }

        // 4. Speed (high priority only, guarded against div-by-near-zero).
        if task.priority == Priority::High && agent.avg_duration > 0.0 {
            score += SPEED_BONUS_NUMERATOR / (agent.avg_duration + 1.0);
        }

        // 5. Similar-context bonus.
        if Self::has_similar_context(agent, &task.description, now) {
            score += SIMILAR_CONTEXT_BONUS;
        }

        // 6. Idle-fairness bonus.
        if let Some(last) = agent.last_task_time {
            if (now - last).num_seconds() > IDLE_FAIRNESS_WINDOW_SECS {
                score += IDLE_FAIRNESS_BONUS;
            }
        }

        score.max(0.0)
    }

    fn has_similar_context(
        agent: &Agent,
        description: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> bool {
        let words: HashSet<String> = tokenize(description);
        agent.recent_completions.iter().any(|completion| {
            let recent_enough =
                (now - completion.completed_at).num_seconds() <= SIMILAR_CONTEXT_WINDOW_SECS;
            recent_enough && {
                let other = tokenize(&completion.description);
                words.intersection(&other).count() > SIMILAR_CONTEXT_MIN_SHARED_WORDS
            }
        })
    }

    /// Variant of `route` used when a specific agent asked for `task` first:
    /// a requesting agent is preferred over the ranked field when it alone
    /// is eligible. Falls through to the full ranking otherwise.
    pub async fn route_preferring(&self, task: &Task, requesting_agent_id: &str) -> Result<String> {
        if let Some(agent) = self.registry.get(requesting_agent_id).await {
            if Self::is_eligible(&agent, &task.task_type) {
                self.registry.increment_load(requesting_agent_id).await;
                let now = chrono::Utc::now();
                self.decisions.lock().await.push(RoutingDecision {
                    timestamp: now,
                    task_id: task.id.clone(),
                    task_type: task.task_type.clone(),
                    selected_agent: Some(requesting_agent_id.to_string()),
                    candidate_scores: vec![CandidateScore {
                        agent_id: requesting_agent_id.to_string(),
                        score: Self::score(&agent, task, now),
                    }],
                });
                debug!(task_id = %task.id, agent_id = requesting_agent_id, "routed task to requesting agent");
                return Ok(requesting_agent_id.to_string());
            }
        }
        self.route(task).await
    }

    /// Selects the winning agent for `task`, or fails with `NoEligibleAgent`.
    /// Does not mutate any state on failure.
    pub async fn route(&self, task: &Task) -> Result<String> {
        let started = std::time::Instant::now();
        let result = self.route_inner(task).await;
        self.telemetry
            .record_metric("router.route_latency_ms", started.elapsed().as_secs_f64() * 1000.0)
            .await;
        result
    }

    async fn route_inner(&self, task: &Task) -> Result<String> {
        let agents = self.registry.snapshot().await;
        let now = chrono::Utc::now();

        let mut candidates: Vec<(Agent, f64)> = agents
            .into_iter()
            .filter(|a| Self::is_eligible(a, &task.task_type))
            .map(|a| {
                let s = Self::score(&a, task, now);
                (a, s)
            })
            .collect();

        if candidates.is_empty() {
            return Err(CoordinatorError::NoEligibleAgent {
                task_type: task.task_type.clone(),
            });
        }

        // Highest score first; ties broken by lowest load, then oldest
        // last_task_time, then lexicographic agent_id.
        candidates.sort_by(|(a1, s1), (a2, s2)| {
            s2.partial_cmp(s1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a1.current_load.cmp(&a2.current_load))
                .then_with(|| a1.last_task_time.cmp(&a2.last_task_time))
                .then_with(|| a1.agent_id.cmp(&a2.agent_id))
        });

        let candidate_scores: Vec<CandidateScore> = candidates
            .iter()
            .map(|(a, s)| CandidateScore {
                agent_id: a.agent_id.clone(),
                score: *s,
            })
            .collect();

        let winner = candidates[0].0.agent_id.clone();

        self.decisions.lock().await.push(RoutingDecision {
            timestamp: now,
            task_id: task.id.clone(),
            task_type: task.task_type.clone(),
            selected_agent: Some(winner.clone()),
            candidate_scores,
        });

        self.registry.increment_load(&winner).await;
        debug!(task_id = %task.id, agent_id = %winner, "routed task");
        Ok(winner)
    }

    /// Updates the winning agent's counters after execution. No-op if the
    /// agent has since been removed (never happens today; agents are
    /// retained indefinitely) or was never known.
    pub async fn report_completion(
        &self,
        agent_id: &str,
        task: &Task,
        success: bool,
        duration: f64,
    ) {
        self.registry
            .apply_completion(agent_id, &task.task_type, &task.description, success, duration)
            .await;
        info!(agent_id, task_id = %task.id, success, duration, "router recorded completion");
    }

    /// Derives improvement hints purely from the agent's own counters.
    pub async fn recommend(&self, agent_id: &str) -> Vec<RoutingAdvice> {
        let Some(agent) = self.registry.get(agent_id).await else {
            return Vec::new();
        };
        agent
            .specializations
            .iter()
            .filter_map(|(capability, stats)| {
                if stats.total < RECOMMEND_MIN_SAMPLES {
                    return None;
                }
                if stats.success_rate < RECOMMEND_LOW_SUCCESS_THRESHOLD {
                    Some(RoutingAdvice {
                        capability: capability.clone(),
                        advice: AdviceKind::Deprioritize,
                        success_rate: stats.success_rate,
                        samples: stats.total,
                    })
                } else if stats.success_rate >= RECOMMEND_HIGH_SUCCESS_THRESHOLD {
                    Some(RoutingAdvice {
                        capability: capability.clone(),
                        advice: AdviceKind::Prefer,
                        success_rate: stats.success_rate,
                        samples: stats.total,
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    /// Proposes load reductions for agents carrying disproportionate load.
    pub async fn rebalance(&self) -> Vec<RebalanceAction> {
        let agents = self.registry.snapshot().await;
        if agents.is_empty() {
            return Vec::new();
        }
        let mean = agents.iter().map(|a| a.current_load as f64).sum::<f64>() / agents.len() as f64;

        agents
            .into_iter()
            .filter(|a| {
                a.current_load as f64 > REBALANCE_MEAN_MULTIPLIER * mean
                    && a.current_load > REBALANCE_ABSOLUTE_FLOOR
            })
            .map(|a| RebalanceAction {
                agent_id: a.agent_id,
                current_load: a.current_load,
                recommended_load: mean.floor() as u32,
            })
            .collect()
    }

    pub async fn recent_decisions(&self, limit: usize) -> Vec<RoutingDecision> {
        let decisions = self.decisions.lock().await;
        decisions.iter().rev().take(limit).cloned().collect()
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;

    fn task(id: &str, task_type: &str, priority: Priority) -> Task {
        let mut t = Task::new(id.to_string(), task_type.to_string(), "echo hi".to_string(), priority);
        t.description = "echo hi".to_string();
        t
    }

    #[tokio::test]
    async fn no_eligible_agent_does_not_mutate_state() {
        let registry = AgentRegistry::new();
        let router = TaskRouter::new(registry.clone());
        router
            .register("a1", "cli", ["code_generation".to_string()].into_iter().collect(), 5)
            .await;

        let t = task("t1", "image_processing", Priority::Normal);
        let err = router.route(&t).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::NoEligibleAgent { .. }));
        let agent = registry.get("a1").await.unwrap();
        assert_eq!(agent.current_load, 0);
    }

    #[tokio::test]
    async fn tie_break_prefers_lexicographically_smaller_agent_id() {
        let registry = AgentRegistry::new();
        let router = TaskRouter::new(registry.clone());
        let caps: HashSet<String> = ["shell_commands".to_string()].into_iter().collect();
        router.register("b_agent", "cli", caps.clone(), 5).await;
        router.register("a_agent", "cli", caps, 5).await;

        let t1 = task("t1", "shell_commands", Priority::Normal);
        let first = router.route(&t1).await.unwrap();
        assert_eq!(first, "a_agent");

        let t2 = task("t2", "shell_commands", Priority::Normal);
        let second = router.route(&t2).await.unwrap();
        assert_eq!(second, "b_agent");
    }

    #[tokio::test]
    async fn rebalance_with_zero_agents_is_empty() {
        let registry = AgentRegistry::new();
        let router = TaskRouter::new(registry);
        assert!(router.rebalance().await.is_empty());
    }

    #[tokio::test]
    async fn high_priority_zero_avg_duration_contributes_nothing() {
        let registry = AgentRegistry::new();
        let router = TaskRouter::new(registry.clone());
        router
            .register("a1", "cli", ["general".to_string()].into_iter().collect(), 5)
            .await;
        let t = task("t1", "general", Priority::High);
        // Should not panic (division guarded) and should succeed.
        let winner = router.route(&t).await.unwrap();
        assert_eq!(winner, "a1");
    }
}
