//! Shared-context synchronizer. A versioned, checksum-verified key/value
//! store with conflict detection and pub/sub notification.

use crate::constants::CONTEXT_CONFLICT_WINDOW_SECS;
use crate::models::SharedContextEntry;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ContextNotification {
    pub target_agent: String,
    pub key: String,
    pub entry: SharedContextEntry,
    pub updated_by: String,
}

struct SyncState {
    context: HashMap<String, SharedContextEntry>,
    subscriptions: HashMap<String, HashSet<String>>,
}

/// The resolver is a replaceable policy; the default is last-write-wins. It
/// must be deterministic and must not block (enforced here by taking plain
/// values rather than anything async).
pub trait ConflictResolver: Send + Sync {
    fn resolve(
        &self,
        existing: &serde_json::Value,
        incoming: serde_json::Value,
    ) -> serde_json::Value;
}

pub struct LastWriteWins;

impl ConflictResolver for LastWriteWins {
    fn resolve(&self, _existing: &serde_json::Value, incoming: serde_json::Value) -> serde_json::Value {
        incoming
    }
}

pub struct SharedContextSynchronizer {
    state: Arc<RwLock<SyncState>>,
    resolver: Arc<dyn ConflictResolver>,
    notify_tx: mpsc::UnboundedSender<ContextNotification>,
}

impl SharedContextSynchronizer {
    /// Spawns the single notification-draining worker and returns the
    /// synchronizer plus the receiving half so the caller (the coordinator's
    /// session layer) can push notifications out to agent streams in the
    /// order they were accepted.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ContextNotification>) {
        Self::with_resolver(Arc::new(LastWriteWins))
    }

    pub fn with_resolver(
        resolver: Arc<dyn ConflictResolver>,
    ) -> (Self, mpsc::UnboundedReceiver<ContextNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sync = Self {
            state: Arc::new(RwLock::new(SyncState {
                context: HashMap::new(),
                subscriptions: HashMap::new(),
            })),
            resolver,
            notify_tx: tx,
        };
        (sync, rx)
    }

    pub fn checksum(value: &serde_json::Value) -> String {
        // serde_json's default `Map` is a `BTreeMap` (the `preserve_order`
        // feature is not enabled), so `to_string` already yields a
        // sorted-keys canonical serialization.
        let canonical = serde_json::to_string(value).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub async fn update(
        &self,
        agent_id: &str,
        key: &str,
        mut value: serde_json::Value,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> SharedContextEntry {
        let now = chrono::Utc::now();
        let mut state = self.state.write().await;

        let next_version = state
            .context
            .get(key)
            .map(|e| e.version + 1)
            .unwrap_or(1);

        if let Some(existing) = state.context.get(key) {
            if has_conflict(existing, &value, now) {
                debug!(key, "shared-context conflict detected, resolving");
                value = self.resolver.resolve(&existing.value, value);
            }
        }

        let checksum = Self::checksum(&value);
        let entry = SharedContextEntry {
            key: key.to_string(),
            value,
            updated_by: agent_id.to_string(),
            timestamp: now,
            version: next_version,
            metadata: metadata.unwrap_or_default(),
            checksum,
        };
        state.context.insert(key.to_string(), entry.clone());

        let subscribers: Vec<String> = state
            .subscriptions
            .iter()
            .filter(|(subscriber, keys)| *subscriber != agent_id && keys.contains(key))
            .map(|(subscriber, _)| subscriber.clone())
            .collect();

        for target_agent in subscribers {
            let _ = self.notify_tx.send(ContextNotification {
                target_agent,
                key: key.to_string(),
                entry: entry.clone(),
                updated_by: agent_id.to_string(),
            });
        }

        entry
    }

    /// Returns the entry only if its checksum verifies.
    pub async fn get(&self, key: &str) -> Option<SharedContextEntry> {
        let state = self.state.read().await;
        let entry = state.context.get(key)?;
        if Self::checksum(&entry.value) == entry.checksum {
            Some(entry.clone())
        } else {
            None
        }
    }

    pub async fn subscribe(&self, agent_id: &str, keys: Vec<String>) {
        let mut state = self.state.write().await;
        state
            .subscriptions
            .entry(agent_id.to_string())
            .or_default()
            .extend(keys);
    }
}

fn has_conflict(
    existing: &SharedContextEntry,
    incoming: &serde_json::Value,
    incoming_timestamp: chrono::DateTime<chrono::Utc>,
) -> bool {
    let delta = (incoming_timestamp - existing.timestamp).num_milliseconds().abs();
    delta < CONTEXT_CONFLICT_WINDOW_SECS * 1000 && existing.value != *incoming
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_then_get_round_trips() {
        let (sync, _rx) = SharedContextSynchronizer::new();
        sync.update("x", "k", serde_json::json!("v1"), None).await;
        let entry = sync.get("k").await.unwrap();
        assert_eq!(entry.value, serde_json::json!("v1"));
        assert_eq!(entry.version, 1);
    }

    #[tokio::test]
    async fn version_increments_monotonically() {
        let (sync, _rx) = SharedContextSynchronizer::new();
        sync.update("x", "k", serde_json::json!("v1"), None).await;
        sync.update("y", "k", serde_json::json!("v2"), None).await;
        let entry = sync.get("k").await.unwrap();
        assert_eq!(entry.version, 2);
    }

    #[tokio::test]
    async fn conflicting_concurrent_update_is_last_write_wins() {
        let (sync, _rx) = SharedContextSynchronizer::new();
        sync.update("x", "k", serde_json::json!("v1"), None).await;
        // Immediately after (within the 1s conflict window) and differing.
        let entry = sync.update("y", "k", serde_json::json!("v2"), None).await;
        assert_eq!(entry.value, serde_json::json!("v2"));
        assert_eq!(entry.version, 2);
    }

    #[tokio::test]
    async fn subscriber_other_than_updater_is_notified_once() {
        let (sync, mut rx) = SharedContextSynchronizer::new();
        sync.subscribe("listener", vec!["k".to_string()]).await;
        sync.update("writer", "k", serde_json::json!("v1"), None).await;

        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.target_agent, "listener");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn checksum_mismatch_makes_get_return_absent() {
        let (sync, _rx) = SharedContextSynchronizer::new();
        sync.update("x", "k", serde_json::json!("v1"), None).await;
        {
            let mut state = sync.state.write().await;
            state.context.get_mut("k").unwrap().checksum = "corrupted".to_string();
        }
        assert!(sync.get("k").await.is_none());
    }
}
