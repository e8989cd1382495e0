//! Per-agent WebSocket session handling. Owns the live transport handles in
//! a map separate from `AgentRegistry`'s data-only inventory, so the
//! inventory and the transport layer never hold owning references to each
//! other (see `Agent`'s doc comment).

use crate::coordinator::Coordinator;
use crate::protocol::{decode_frame, encode_frame, AgentRegistration, Frame};
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Registry of live outbound channels, one per connected agent. Sending is
/// best-effort: a full or closed channel just drops the frame; the
/// coordinator never blocks on a slow agent.
#[derive(Clone, Default)]
pub struct SessionTable {
    senders: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<Message>>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    async fn insert(&self, agent_id: &str, tx: mpsc::UnboundedSender<Message>) {
        self.senders.write().await.insert(agent_id.to_string(), tx);
    }

    async fn remove(&self, agent_id: &str) {
        self.senders.write().await.remove(agent_id);
    }

    pub async fn send_frame(&self, agent_id: &str, frame: &Frame) -> bool {
        let Ok(text) = encode_frame(frame) else {
            return false;
        };
        let senders = self.senders.read().await;
        match senders.get(agent_id) {
            Some(tx) => tx.send(Message::Text(text.into())).is_ok(),
            None => false,
        }
    }

    /// Sends `frame` to every connected agent, best-effort. A single
    /// stalled/closed channel is just skipped; it never interrupts delivery
    /// to the rest of the set.
    pub async fn broadcast_frame(&self, frame: &Frame) {
        let Ok(text) = encode_frame(frame) else {
            return;
        };
        let senders = self.senders.read().await;
        for tx in senders.values() {
            let _ = tx.send(Message::Text(text.clone().into()));
        }
    }

    pub async fn connected_count(&self) -> usize {
        self.senders.read().await.len()
    }
}

/// Drives one agent's connection end-to-end: reads the mandatory
/// `AGENT_REGISTER` first frame, then dispatches every subsequent frame to
/// the coordinator, until the socket closes.
pub async fn run_agent_session(coordinator: Arc<Coordinator>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

    let agent_id = match ws_rx.next().await {
        Some(Ok(Message::Text(text))) => match decode_frame(&text) {
            Ok(Frame::AgentRegister { agent }) => {
                let agent_id = register_agent(&coordinator, &agent).await;
                coordinator.sessions.insert(&agent_id, out_tx.clone()).await;
                agent_id
            }
            _ => {
                warn!("first frame on a new connection was not AGENT_REGISTER, dropping");
                return;
            }
        },
        _ => return,
    };

    let forward_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = ws_rx.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_frame(&coordinator, &agent_id, &text).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                debug!(agent_id, error = %err, "websocket read error, closing session");
                break;
            }
        }
    }

    coordinator.sessions.remove(&agent_id).await;
    coordinator.agents.mark_disconnected(&agent_id).await;
    coordinator
        .telemetry
        .record_event(
            "agent.disconnected",
            [("agent_id".to_string(), serde_json::json!(agent_id))]
                .into_iter()
                .collect(),
        )
        .await;
    let status = coordinator.snapshot_status().await;
    coordinator
        .sessions
        .broadcast_frame(&Frame::SystemStatusUpdate { status })
        .await;
    info!(agent_id, "agent session closed");
    forward_task.abort();
}

async fn register_agent(coordinator: &Coordinator, registration: &AgentRegistration) -> String {
    coordinator
        .agents
        .register(
            &registration.agent_id,
            &registration.agent_type,
            registration.capabilities.iter().cloned().collect(),
            registration.max_concurrent_tasks,
        )
        .await;
    coordinator
        .telemetry
        .record_event(
            "agent.connected",
            [("agent_id".to_string(), serde_json::json!(registration.agent_id))]
                .into_iter()
                .collect(),
        )
        .await;
    info!(agent_id = %registration.agent_id, "agent registered over websocket");
    registration.agent_id.clone()
}

async fn handle_frame(coordinator: &Arc<Coordinator>, agent_id: &str, text: &str) {
    let frame = match decode_frame(text) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(agent_id, error = %err, "malformed frame, ignored");
            return;
        }
    };

    match frame {
        Frame::Heartbeat { status, .. } => {
            coordinator.agents.record_heartbeat(agent_id, status).await;
        }
        Frame::TaskRequest { .. } => {
            coordinator.dispatch_task_request(agent_id).await;
        }
        Frame::TaskComplete { task, result, .. } => {
            coordinator
                .lifecycle
                .handle_task_complete(agent_id, &task.id, result)
                .await;
        }
        Frame::TaskError { task, error, .. } => {
            coordinator
                .lifecycle
                .handle_task_error(agent_id, &task.id, error)
                .await;
        }
        Frame::TaskDelegation { from, to, task } => {
            let task_type = task.task_type.unwrap_or_else(|| "general".to_string());
            let description = task.description.unwrap_or_default();
            let delegated = coordinator
                .lifecycle
                .handle_delegation(&from, &to, task_type, description)
                .await;
            if delegated.status == crate::models::TaskStatus::Assigned {
                coordinator
                    .sessions
                    .send_frame(&to, &Frame::TaskAssignment { task: delegated })
                    .await;
            }
        }
        Frame::ContextSync { agent_id, context } => {
            let entry = coordinator
                .context
                .update(&agent_id, &context.key, context.value, context.metadata)
                .await;
            debug!(agent_id, key = %entry.key, version = entry.version, "shared context updated");
        }
        Frame::AgentRegister { .. }
        | Frame::TaskAssignment { .. }
        | Frame::SystemStatusUpdate { .. } => {
            debug!(agent_id, "frame type not expected from an agent, ignored");
        }
        Frame::Unknown => {
            debug!(agent_id, "unknown frame type, ignored");
        }
    }
}
