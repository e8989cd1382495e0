//! # Agent Mesh Coordinator
//!
//! A distributed agent-orchestration platform: a coordinator process that
//! routes tasks to a fleet of connected agent processes by capability and
//! historical performance, tracks each task through its lifecycle, keeps a
//! shared-context store in sync across agents, and publishes a live view to
//! a dashboard, plus the agent-side client that connects to it.
//!
//! ## Architecture
//!
//! - **Agent Registry**: the single-owning-partition inventory of connected
//!   agents and their capabilities/performance counters.
//! - **Task Router**: capability-aware, multi-factor scoring over the
//!   registry.
//! - **Lifecycle Engine**: the task queue, active-task map and completed log.
//! - **Shared Context Synchronizer**: versioned, checksum-verified key/value
//!   store with pub/sub notification.
//! - **Dashboard Publisher**: a denormalized live view plus a separate
//!   report-ingestion surface.
//! - **Agent Client**: the reconnecting process that executes assigned work.

/// Wire protocol decode error types and the top-level `Result` alias.
pub mod error;
/// System-wide constants.
pub mod constants;
/// Core data models.
pub mod models;
/// Agent ↔ coordinator wire protocol.
pub mod protocol;
/// Configuration for both binaries.
pub mod config;
/// Capability-aware task router.
pub mod router;
/// Shared-context synchronizer.
pub mod sync;
/// In-process telemetry.
pub mod telemetry;
/// Narrow persistence adapter.
pub mod persistence;
/// The coordinator process: registry, router, lifecycle engine, sessions.
pub mod coordinator;
/// Dashboard publisher and HTTP surface.
pub mod dashboard;
/// Agent-side reconnecting client.
pub mod client;

#[cfg(test)]
mod tests;

pub use error::{CoordinatorError, Result};
