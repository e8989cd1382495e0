//! Narrow persistence adapter. The on-disk schema (task history, knowledge
//! base, cache metadata) is explicitly out of scope; what's in scope is the
//! trait boundary so the rest of the system can depend on "record a
//! completed task" without committing to a storage engine: a trait plus one
//! bounded in-memory implementation used by default and in tests.

use crate::models::CompletedTaskRecord;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default)]
pub struct AgentPerformance {
    pub total_tasks: u32,
    pub success_rate: f64,
    pub avg_duration: f64,
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn record_completed(&self, record: CompletedTaskRecord);
    async fn recent_for_type(&self, task_type: &str, limit: usize) -> Vec<CompletedTaskRecord>;
    async fn agent_performance(&self, agent_id: &str) -> AgentPerformance;
    async fn store_knowledge(&self, key: String, value: serde_json::Value, category: String);
    async fn get_knowledge(&self, key: &str) -> Option<serde_json::Value>;
}

/// Default in-memory store: a `max_records`-capped `VecDeque` with bounded
/// FIFO eviction.
pub struct InMemoryTaskRepository {
    max_records: usize,
    records: Mutex<VecDeque<CompletedTaskRecord>>,
    knowledge: Mutex<std::collections::HashMap<String, (serde_json::Value, String)>>,
}

impl InMemoryTaskRepository {
    pub fn new(max_records: usize) -> Arc<Self> {
        Arc::new(Self {
            max_records,
            records: Mutex::new(VecDeque::new()),
            knowledge: Mutex::new(std::collections::HashMap::new()),
        })
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn record_completed(&self, record: CompletedTaskRecord) {
        let mut records = self.records.lock().await;
        records.push_back(record);
        while records.len() > self.max_records {
            records.pop_front();
        }
    }

    async fn recent_for_type(&self, task_type: &str, limit: usize) -> Vec<CompletedTaskRecord> {
        let records = self.records.lock().await;
        records
            .iter()
            .rev()
            .filter(|r| r.task.task_type == task_type)
            .take(limit)
            .cloned()
            .collect()
    }

    async fn agent_performance(&self, agent_id: &str) -> AgentPerformance {
        let records = self.records.lock().await;
        let mine: Vec<&CompletedTaskRecord> = records
            .iter()
            .filter(|r| r.agent_id == agent_id)
            .collect();
        if mine.is_empty() {
            return AgentPerformance::default();
        }
        let total = mine.len() as u32;
        let successful = mine
            .iter()
            .filter(|r| matches!(r.outcome, crate::models::TaskOutcome::Success { .. }))
            .count() as f64;
        let avg_duration = mine.iter().map(|r| r.duration).sum::<f64>() / total as f64;
        AgentPerformance {
            total_tasks: total,
            success_rate: successful / total as f64,
            avg_duration,
        }
    }

    async fn store_knowledge(&self, key: String, value: serde_json::Value, category: String) {
        self.knowledge.lock().await.insert(key, (value, category));
    }

    async fn get_knowledge(&self, key: &str) -> Option<serde_json::Value> {
        self.knowledge
            .lock()
            .await
            .get(key)
            .map(|(value, _)| value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Task, TaskOutcome};

    #[tokio::test]
    async fn records_and_retrieves_recent_completions() {
        let store = InMemoryTaskRepository::new(10);
        let task = Task::new(
            "t1".to_string(),
            "shell_commands".to_string(),
            "echo hi".to_string(),
            crate::models::Priority::Normal,
        );
        store
            .record_completed(CompletedTaskRecord {
                task,
                agent_id: "a1".to_string(),
                duration: 1.5,
                outcome: TaskOutcome::Success {
                    result: serde_json::json!({"code": 0}),
                },
            })
            .await;

        let recent = store.recent_for_type("shell_commands", 10).await;
        assert_eq!(recent.len(), 1);
        let perf = store.agent_performance("a1").await;
        assert_eq!(perf.total_tasks, 1);
        assert_eq!(perf.success_rate, 1.0);
    }

    #[tokio::test]
    async fn bounded_eviction_keeps_only_max_records() {
        let store = InMemoryTaskRepository::new(2);
        for i in 0..5 {
            let task = Task::new(
                format!("t{i}"),
                "general".to_string(),
                "d".to_string(),
                crate::models::Priority::Normal,
            );
            store
                .record_completed(CompletedTaskRecord {
                    task,
                    agent_id: "a1".to_string(),
                    duration: 1.0,
                    outcome: TaskOutcome::Success {
                        result: serde_json::json!({}),
                    },
                })
                .await;
        }
        let perf = store.agent_performance("a1").await;
        assert_eq!(perf.total_tasks, 2);
    }
}
