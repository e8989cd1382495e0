//! Agent-side reconnecting client. Runs as a separate process from the
//! coordinator; maintains one long-lived WebSocket connection with
//! exponential-backoff reconnect, emits heartbeats, optionally self-requests
//! work when idle, executes assigned tasks, and reports completions back.

use crate::config::AgentConfig;
use crate::constants::{RECONNECT_BACKOFF_INITIAL_SECS, RECONNECT_BACKOFF_MAX_SECS};
use crate::dashboard::ReportEvent;
use crate::models::AgentStatus;
use crate::protocol::{decode_frame, encode_frame, AgentRegistration, Frame};
use crate::{CoordinatorError, Result};
use futures_util::{SinkExt, StreamExt};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Process-stable, non-cryptographic-strength hash used purely as a cache
/// key. Rust's default `SipHash` is reseeded per process, so the same
/// description would miss the cache across agent restarts. SHA-256
/// truncated to 64 bits is deterministic across runs and we already depend
/// on `sha2` for the shared-context checksum.
fn stable_hash(text: &str) -> u64 {
    let digest = Sha256::digest(text.as_bytes());
    u64::from_be_bytes(digest[0..8].try_into().unwrap())
}

pub struct AgentClient {
    config: AgentConfig,
    http: reqwest::Client,
    result_cache: Mutex<HashMap<(String, u64), serde_json::Value>>,
    busy: AtomicBool,
}

impl AgentClient {
    pub fn new(config: AgentConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            http: reqwest::Client::new(),
            result_cache: Mutex::new(HashMap::new()),
            busy: AtomicBool::new(false),
        })
    }

    /// Supervises the connection forever: connect, run, and on any
    /// disconnect or handshake failure, sleep with exponential backoff
    /// (reset to the floor after a connection that stayed up) and retry.
    pub async fn run(self: Arc<Self>) {
        let mut backoff = RECONNECT_BACKOFF_INITIAL_SECS;
        loop {
            match self.connect_and_serve().await {
                Ok(()) => {
                    info!("connection closed cleanly, reconnecting");
                    backoff = RECONNECT_BACKOFF_INITIAL_SECS;
                }
                Err(err) => {
                    warn!(error = %err, backoff_secs = backoff, "connection lost, backing off");
                }
            }
            tokio::time::sleep(std::time::Duration::from_secs(backoff)).await;
            backoff = (backoff * 2).min(RECONNECT_BACKOFF_MAX_SECS);
        }
    }

    async fn connect_and_serve(self: &Arc<Self>) -> Result<()> {
        let (ws, _response) = tokio_tungstenite::connect_async(&self.config.coordination_server)
            .await
            .map_err(|e| CoordinatorError::TransportClosed(e.to_string()))?;
        info!(agent_id = %self.config.agent_id, "connected to coordinator");
        let (mut tx, mut rx) = ws.split();

        let registration = Frame::AgentRegister {
            agent: AgentRegistration {
                agent_id: self.config.agent_id.clone(),
                agent_type: self.config.agent_type.clone(),
                capabilities: self.config.capabilities.clone(),
                max_concurrent_tasks: self.config.max_concurrent_tasks,
                status: AgentStatus::Idle,
            },
        };
        send_frame(&mut tx, &registration).await?;

        let (out_tx, mut out_rx) = tokio::sync::mpsc::unbounded_channel::<Frame>();

        let heartbeat_self = self.clone();
        let heartbeat_out = out_tx.clone();
        let heartbeat_task = tokio::spawn(async move {
            heartbeat_self.run_heartbeat(heartbeat_out).await;
        });

        let requester_self = self.clone();
        let requester_out = out_tx.clone();
        let requester_task = tokio::spawn(async move {
            requester_self.run_auto_requester(requester_out).await;
        });

        let result = loop {
            tokio::select! {
                outgoing = out_rx.recv() => {
                    let Some(frame) = outgoing else { break Ok(()) };
                    if send_frame(&mut tx, &frame).await.is_err() {
                        break Err(CoordinatorError::TransportClosed("send failed".to_string()));
                    }
                }
                incoming = rx.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            self.clone().handle_incoming(&text, out_tx.clone()).await;
                        }
                        Some(Ok(Message::Close(_))) | None => break Ok(()),
                        Some(Ok(_)) => continue,
                        Some(Err(err)) => break Err(CoordinatorError::TransportClosed(err.to_string())),
                    }
                }
            }
        };

        heartbeat_task.abort();
        requester_task.abort();
        result
    }

    async fn run_heartbeat(self: Arc<Self>, out: tokio::sync::mpsc::UnboundedSender<Frame>) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(self.config.heartbeat_interval_ms));
        loop {
            ticker.tick().await;
            let status = if self.busy.load(Ordering::SeqCst) {
                AgentStatus::Busy
            } else {
                AgentStatus::Idle
            };
            let _ = out.send(Frame::Heartbeat {
                agent_id: self.config.agent_id.clone(),
                status,
            });
        }
    }

    async fn run_auto_requester(self: Arc<Self>, out: tokio::sync::mpsc::UnboundedSender<Frame>) {
        if !self.config.auto_request_tasks {
            return;
        }
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(self.config.idle_timeout_seconds));
        loop {
            ticker.tick().await;
            if !self.busy.load(Ordering::SeqCst) {
                let _ = out.send(Frame::TaskRequest {
                    agent_id: self.config.agent_id.clone(),
                });
            }
        }
    }

    async fn handle_incoming(self: Arc<Self>, text: &str, out: tokio::sync::mpsc::UnboundedSender<Frame>) {
        let frame = match decode_frame(text) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "malformed frame from coordinator, ignored");
                return;
            }
        };

        match frame {
            Frame::TaskAssignment { task } => {
                let client = self.clone();
                tokio::spawn(async move {
                    client.execute_and_report(task, out).await;
                });
            }
            Frame::ContextSync { .. } | Frame::SystemStatusUpdate { .. } => {
                debug!("received coordinator push frame");
            }
            Frame::Unknown => debug!("unknown frame type from coordinator, ignored"),
            _ => {}
        }
    }

    async fn execute_and_report(self: Arc<Self>, task: crate::models::Task, out: tokio::sync::mpsc::UnboundedSender<Frame>) {
        self.busy.store(true, Ordering::SeqCst);
        let cache_key = (task.task_type.clone(), stable_hash(&task.description));

        if let Some(cached) = self.result_cache.lock().await.get(&cache_key).cloned() {
            info!(task_id = %task.id, "serving task result from local cache");
            self.report_completion(&task, Ok(cached), out).await;
            self.busy.store(false, Ordering::SeqCst);
            return;
        }

        self.report_dashboard(ReportEvent::TaskStart {
            agent_id: self.config.agent_id.clone(),
            task_id: task.id.clone(),
            task: serde_json::json!({"type": task.task_type, "description": task.description}),
        })
        .await;

        let outcome = self.dispatch(&task).await;
        if let Ok(value) = &outcome {
            self.result_cache.lock().await.insert(cache_key, value.clone());
        }
        self.report_completion(&task, outcome, out).await;
        self.busy.store(false, Ordering::SeqCst);
    }

    /// Dispatches execution by `task.type`. `shell_commands` is the only
    /// concrete executor this client implements; any other type produces a
    /// generic acknowledgement so the lifecycle and router still see a
    /// completion.
    async fn dispatch(&self, task: &crate::models::Task) -> std::result::Result<serde_json::Value, String> {
        match task.task_type.as_str() {
            "shell_commands" => {
                let command = task
                    .payload
                    .as_ref()
                    .and_then(|p| p.get("command"))
                    .and_then(|c| c.as_str())
                    .unwrap_or(&task.description);
                self.run_shell_task(command).await
            }
            _ => Ok(serde_json::json!({
                "type": task.task_type,
                "description": task.description,
                "status": "acknowledged",
            })),
        }
    }

    async fn run_shell_task(&self, command: &str) -> std::result::Result<serde_json::Value, String> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| format!("failed to spawn shell command: {e}"))?;

        Ok(serde_json::json!({
            "code": output.status.code().unwrap_or(-1),
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
        }))
    }

    async fn report_completion(
        &self,
        task: &crate::models::Task,
        outcome: std::result::Result<serde_json::Value, String>,
        out: tokio::sync::mpsc::UnboundedSender<Frame>,
    ) {
        let task_ref = crate::protocol::CompletedTaskRef {
            id: task.id.clone(),
            extra: HashMap::new(),
        };
        match outcome {
            Ok(result) => {
                let _ = out.send(Frame::TaskComplete {
                    agent_id: self.config.agent_id.clone(),
                    task: task_ref,
                    result: result.clone(),
                });
                self.report_dashboard(ReportEvent::TaskComplete {
                    agent_id: self.config.agent_id.clone(),
                    result,
                })
                .await;
            }
            Err(error) => {
                let _ = out.send(Frame::TaskError {
                    agent_id: self.config.agent_id.clone(),
                    task: task_ref,
                    error: error.clone(),
                });
                self.report_dashboard(ReportEvent::TaskError {
                    agent_id: self.config.agent_id.clone(),
                    error,
                })
                .await;
            }
        }
    }

    /// Best-effort push to the dashboard's separate report-ingestion
    /// endpoint. A failed send never tears down the coordinator connection.
    async fn report_dashboard(&self, event: ReportEvent) {
        let Some(endpoint) = &self.config.report_endpoint else {
            return;
        };
        if let Err(err) = self.http.post(endpoint).json(&event).send().await {
            error!(error = %err, "failed to post report to dashboard, continuing");
        }
    }
}

async fn send_frame(
    tx: &mut (impl futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    frame: &Frame,
) -> Result<()> {
    let text = encode_frame(frame)?;
    tx.send(Message::Text(text.into()))
        .await
        .map_err(|e| CoordinatorError::TransportClosed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, Task};

    #[test]
    fn stable_hash_is_deterministic_across_calls() {
        assert_eq!(stable_hash("echo hi"), stable_hash("echo hi"));
        assert_ne!(stable_hash("echo hi"), stable_hash("echo bye"));
    }

    fn test_config() -> AgentConfig {
        AgentConfig {
            agent_id: "a1".to_string(),
            agent_type: "cli".to_string(),
            capabilities: vec!["general".to_string()],
            max_concurrent_tasks: 5,
            heartbeat_interval_ms: 5000,
            idle_timeout_seconds: 10,
            coordination_server: "ws://127.0.0.1:8766/ws/agent".to_string(),
            report_endpoint: None,
            auto_request_tasks: false,
            cache_dir: ".agent-cache".to_string(),
            cache_max_size_mb: 500,
            memory_db_path: None,
        }
    }

    /// Scenario 6 (cache hit): a second task identical in `(type,
    /// description)` to a previously-executed one is served from the local
    /// cache without dispatching again, and still reports a `TASK_COMPLETE`.
    #[tokio::test]
    async fn identical_task_is_served_from_cache_without_redispatch() {
        let client = AgentClient::new(test_config());
        let task = Task::new(
            "t1".to_string(),
            "general".to_string(),
            "d".to_string(),
            Priority::Normal,
        );
        let cache_key = (task.task_type.clone(), stable_hash(&task.description));
        let cached_result = serde_json::json!({"pre_cached": true});
        client
            .result_cache
            .lock()
            .await
            .insert(cache_key, cached_result.clone());

        let (out_tx, mut out_rx) = tokio::sync::mpsc::unbounded_channel::<Frame>();
        client.clone().execute_and_report(task, out_tx).await;

        let frame = out_rx.recv().await.unwrap();
        match frame {
            Frame::TaskComplete { result, .. } => assert_eq!(result, cached_result),
            other => panic!("expected TaskComplete, got {other:?}"),
        }
        assert!(!client.busy.load(Ordering::SeqCst));
    }
}
