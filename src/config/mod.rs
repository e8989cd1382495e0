//! Configuration. Two independent env-driven configs: `CoordinatorConfig`
//! for the coordinator binary, `AgentConfig` for the agent client binary.
//! Loaded with `dotenvy`, kept intentionally permissive (defaults for
//! everything non-identity) since this system has no API keys or secrets
//! to validate at startup.

use crate::constants::{
    AGENT_MONITOR_INTERVAL_SECS, AGENT_UNRESPONSIVE_THRESHOLD_SECS, DEFAULT_COORDINATOR_HOST,
    DEFAULT_COORDINATOR_PORT, DEFAULT_DASHBOARD_HOST, DEFAULT_DASHBOARD_PORT,
    DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENT_TASKS,
    MAX_QUEUE_SIZE,
};
use crate::{CoordinatorError, Result};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub host: String,
    pub port: u16,
    pub dashboard_host: String,
    pub dashboard_port: u16,
    pub max_queue_size: usize,
    pub agent_unresponsive_seconds: i64,
    pub agent_monitor_interval_seconds: u64,
    pub log_level: String,
}

impl CoordinatorConfig {
    pub fn load() -> Result<Self> {
        load_dotenv();

        let port = parse_env("COORDINATOR_PORT", DEFAULT_COORDINATOR_PORT)?;
        let dashboard_port = parse_env("DASHBOARD_PORT", DEFAULT_DASHBOARD_PORT)?;

        if port == dashboard_port {
            return Err(CoordinatorError::Configuration(format!(
                "COORDINATOR_PORT and DASHBOARD_PORT must differ (both {port})"
            )));
        }

        Ok(Self {
            host: env::var("COORDINATOR_HOST").unwrap_or_else(|_| DEFAULT_COORDINATOR_HOST.to_string()),
            port,
            dashboard_host: env::var("DASHBOARD_HOST").unwrap_or_else(|_| DEFAULT_DASHBOARD_HOST.to_string()),
            dashboard_port,
            max_queue_size: parse_env("MAX_QUEUE_SIZE", MAX_QUEUE_SIZE)?,
            agent_unresponsive_seconds: parse_env(
                "AGENT_UNRESPONSIVE_SECONDS",
                AGENT_UNRESPONSIVE_THRESHOLD_SECS,
            )?,
            agent_monitor_interval_seconds: parse_env(
                "AGENT_MONITOR_INTERVAL_SECONDS",
                AGENT_MONITOR_INTERVAL_SECS,
            )?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_id: String,
    pub agent_type: String,
    pub capabilities: Vec<String>,
    pub max_concurrent_tasks: u32,
    pub heartbeat_interval_ms: u64,
    pub idle_timeout_seconds: u64,
    pub coordination_server: String,
    pub report_endpoint: Option<String>,
    pub auto_request_tasks: bool,
    pub cache_dir: String,
    pub cache_max_size_mb: u64,
    pub memory_db_path: Option<String>,
}

impl AgentConfig {
    pub fn load() -> Result<Self> {
        load_dotenv();

        let coordination_server = env::var("COORDINATION_SERVER")
            .unwrap_or_else(|_| "ws://127.0.0.1:8766/ws/agent".to_string());
        url::Url::parse(&coordination_server).map_err(|e| {
            CoordinatorError::Configuration(format!("invalid COORDINATION_SERVER: {e}"))
        })?;

        let report_endpoint = env::var("REPORT_ENDPOINT").ok();
        if let Some(endpoint) = &report_endpoint {
            url::Url::parse(endpoint).map_err(|e| {
                CoordinatorError::Configuration(format!("invalid REPORT_ENDPOINT: {e}"))
            })?;
        }

        let capabilities = env::var("AGENT_CAPABILITIES")
            .unwrap_or_else(|_| "general".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            agent_id: env::var("AGENT_ID").unwrap_or_else(|_| default_agent_id()),
            agent_type: env::var("AGENT_TYPE").unwrap_or_else(|_| "generic".to_string()),
            capabilities,
            max_concurrent_tasks: parse_env("MAX_CONCURRENT_TASKS", DEFAULT_MAX_CONCURRENT_TASKS)?,
            heartbeat_interval_ms: parse_env("HEARTBEAT_INTERVAL_MS", DEFAULT_HEARTBEAT_INTERVAL_MS)?,
            idle_timeout_seconds: parse_env("IDLE_TIMEOUT_SECONDS", DEFAULT_IDLE_TIMEOUT_SECS)?,
            coordination_server,
            report_endpoint,
            auto_request_tasks: parse_env("AUTO_REQUEST_TASKS", true)?,
            cache_dir: env::var("CACHE_DIR").unwrap_or_else(|_| ".agent-cache".to_string()),
            cache_max_size_mb: parse_env("CACHE_MAX_SIZE_MB", 500u64)?,
            memory_db_path: env::var("MEMORY_DB_PATH").ok(),
        })
    }
}

fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::info!(?path, "loaded .env file"),
        Err(_) => tracing::debug!("no .env file found, relying on process environment"),
    }
}

fn default_agent_id() -> String {
    use rand::Rng;
    let suffix: u32 = rand::thread_rng().gen_range(100_000..999_999);
    format!("agent-{suffix}")
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| CoordinatorError::Configuration(format!("{key}: {e}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_agent_id_has_expected_prefix() {
        assert!(default_agent_id().starts_with("agent-"));
    }

    #[test]
    fn parse_env_falls_back_to_default_when_unset() {
        std::env::remove_var("__NOT_SET_TEST_KEY__");
        let value: u16 = parse_env("__NOT_SET_TEST_KEY__", 1234).unwrap();
        assert_eq!(value, 1234);
    }
}
