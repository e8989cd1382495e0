use thiserror::Error;

/// Convenience type alias for Results with CoordinatorError
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Main error type for the coordinator and agent client.
///
/// Kinds mirror the failure modes actually surfaced by the router, session
/// manager, lifecycle engine, and shared-context synchronizer: router and
/// sync errors are explicit outcomes callers branch on, while transport and
/// execution errors are recovered locally and only logged.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("no eligible agent for task type '{task_type}'")]
    NoEligibleAgent { task_type: String },

    #[error("transport closed: {0}")]
    TransportClosed(String),

    #[error("malformed frame: {0}")]
    DecodeError(String),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("task execution error: {task_id} - {message}")]
    TaskExecution { task_id: String, message: String },

    #[error("shared context checksum mismatch for key '{0}'")]
    ChecksumMismatch(String),

    #[error("resource busy: {0}")]
    ResourceBusy(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("task queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("invalid task state transition: {0}")]
    InvalidTransition(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
