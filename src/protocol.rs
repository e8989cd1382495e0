//! Agent ↔ Coordinator wire protocol. Every frame is a JSON object tagged by
//! `type`; unrecognized tags decode to `Frame::Unknown` and are logged and
//! dropped by the caller rather than treated as a decode error. Fields not
//! explicitly modeled round-trip through the `extra` maps below via
//! `#[serde(flatten)]`.

use crate::models::{AgentStatus, Task};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub agent_id: String,
    #[serde(rename = "type")]
    pub agent_type: String,
    pub capabilities: Vec<String>,
    pub max_concurrent_tasks: u32,
    #[serde(default = "default_register_status")]
    pub status: AgentStatus,
}

fn default_register_status() -> AgentStatus {
    AgentStatus::Idle
}

/// The `task` object carried on `TASK_COMPLETE`. Only `id` is load-bearing
/// for the coordinator's active-map cross-check; everything else is
/// forwarded opaquely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedTaskRef {
    pub id: String,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationTaskPayload {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSyncPayload {
    pub key: String,
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatusPayload {
    pub total_agents: usize,
    pub active_agents: usize,
    pub idle_agents: usize,
    pub tasks_in_queue: usize,
    pub active_tasks: usize,
    pub completed_tasks: usize,
}

/// A single protocol frame. `#[serde(tag = "type")]` makes the `type` field
/// the discriminant; `#[serde(other)]` catches any tag this port doesn't
/// recognize instead of failing to parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    #[serde(rename = "AGENT_REGISTER")]
    AgentRegister { agent: AgentRegistration },

    #[serde(rename = "HEARTBEAT")]
    Heartbeat { agent_id: String, status: AgentStatus },

    #[serde(rename = "TASK_REQUEST")]
    TaskRequest { agent_id: String },

    #[serde(rename = "TASK_COMPLETE")]
    TaskComplete {
        agent_id: String,
        task: CompletedTaskRef,
        result: serde_json::Value,
    },

    #[serde(rename = "TASK_ERROR")]
    TaskError {
        agent_id: String,
        task: CompletedTaskRef,
        error: String,
    },

    #[serde(rename = "TASK_DELEGATION")]
    TaskDelegation {
        from: String,
        to: String,
        task: DelegationTaskPayload,
    },

    #[serde(rename = "CONTEXT_SYNC")]
    ContextSync {
        agent_id: String,
        context: ContextSyncPayload,
    },

    #[serde(rename = "TASK_ASSIGNMENT")]
    TaskAssignment { task: Task },

    #[serde(rename = "SYSTEM_STATUS_UPDATE")]
    SystemStatusUpdate { status: SystemStatusPayload },

    #[serde(other)]
    Unknown,
}

impl Frame {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Frame::AgentRegister { .. } => "AGENT_REGISTER",
            Frame::Heartbeat { .. } => "HEARTBEAT",
            Frame::TaskRequest { .. } => "TASK_REQUEST",
            Frame::TaskComplete { .. } => "TASK_COMPLETE",
            Frame::TaskError { .. } => "TASK_ERROR",
            Frame::TaskDelegation { .. } => "TASK_DELEGATION",
            Frame::ContextSync { .. } => "CONTEXT_SYNC",
            Frame::TaskAssignment { .. } => "TASK_ASSIGNMENT",
            Frame::SystemStatusUpdate { .. } => "SYSTEM_STATUS_UPDATE",
            Frame::Unknown => "UNKNOWN",
        }
    }
}

/// Decodes a raw text frame. A JSON syntax error or a recognized tag missing
/// a required field surfaces as `DecodeError`; an unrecognized tag decodes
/// successfully to `Frame::Unknown` instead (a decode-then-ignore, not a
/// decode failure), so unknown frame types are logged and dropped rather
/// than tearing down the connection.
pub fn decode_frame(raw: &str) -> crate::Result<Frame> {
    serde_json::from_str(raw).map_err(|e| crate::CoordinatorError::DecodeError(e.to_string()))
}

pub fn encode_frame(frame: &Frame) -> crate::Result<String> {
    serde_json::to_string(frame).map_err(crate::CoordinatorError::Serialization)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_agent_register() {
        let raw = r#"{"type":"AGENT_REGISTER","agent":{"agent_id":"a1","type":"cli","capabilities":["shell_commands","general"],"max_concurrent_tasks":5,"status":"idle"}}"#;
        let frame = decode_frame(raw).unwrap();
        match frame {
            Frame::AgentRegister { agent } => {
                assert_eq!(agent.agent_id, "a1");
                assert_eq!(agent.capabilities.len(), 2);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_decodes_to_unknown_rather_than_error() {
        let raw = r#"{"type":"SOMETHING_NEW","whatever":1}"#;
        let frame = decode_frame(raw).unwrap();
        assert!(matches!(frame, Frame::Unknown));
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let raw = "{not json";
        assert!(decode_frame(raw).is_err());
    }

    #[test]
    fn task_complete_forwards_unlisted_fields_opaquely() {
        let raw = r#"{"type":"TASK_COMPLETE","agent_id":"a1","task":{"id":"t1","extra_field":"kept"},"result":{"code":0}}"#;
        let frame = decode_frame(raw).unwrap();
        match frame {
            Frame::TaskComplete { task, .. } => {
                assert_eq!(task.id, "t1");
                assert_eq!(task.extra.get("extra_field").unwrap(), "kept");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
