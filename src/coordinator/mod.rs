//! The coordinator process: composes the agent registry, task router,
//! lifecycle engine, shared-context synchronizer, telemetry and dashboard
//! into one running service.

pub mod agent_registry;
pub mod lifecycle;
pub mod session;

use crate::config::CoordinatorConfig;
use crate::dashboard::DashboardPublisher;
use crate::models::{Priority, Task};
use crate::persistence::TaskRepository;
use crate::protocol::{ContextSyncPayload, Frame};
use crate::router::TaskRouter;
use crate::sync::SharedContextSynchronizer;
use crate::telemetry::Telemetry;
use crate::{CoordinatorError, Result};
use agent_registry::AgentRegistry;
use axum::{
    extract::ws::WebSocketUpgrade,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use lifecycle::LifecycleEngine;
use serde::Deserialize;
use session::SessionTable;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

pub struct Coordinator {
    pub agents: AgentRegistry,
    pub router: TaskRouter,
    pub lifecycle: LifecycleEngine,
    pub context: SharedContextSynchronizer,
    pub telemetry: Telemetry,
    pub dashboard: DashboardPublisher,
    pub sessions: SessionTable,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig, repository: Arc<dyn TaskRepository>) -> (Arc<Self>, tokio::sync::mpsc::UnboundedReceiver<crate::sync::ContextNotification>) {
        let agents = AgentRegistry::new();
        let telemetry = Telemetry::new();
        let router = TaskRouter::new(agents.clone()).with_telemetry(telemetry.clone());
        let dashboard = DashboardPublisher::new();
        let lifecycle = LifecycleEngine::with_config(
            router.clone(),
            repository,
            dashboard.clone(),
            telemetry.clone(),
            config.max_queue_size,
        );
        let (context, notify_rx) = SharedContextSynchronizer::new();

        let coordinator = Arc::new(Self {
            agents,
            router,
            lifecycle,
            context,
            telemetry,
            dashboard,
            sessions: SessionTable::new(),
            config,
        });
        (coordinator, notify_rx)
    }

    /// Pulls the next queued task for `agent_id` and, if one was assigned,
    /// pushes a `TASK_ASSIGNMENT` frame over its live session.
    pub async fn dispatch_task_request(&self, agent_id: &str) {
        match self.lifecycle.request_task(agent_id).await {
            Ok(Some(task)) => {
                self.sessions
                    .send_frame(agent_id, &Frame::TaskAssignment { task })
                    .await;
            }
            Ok(None) => {}
            Err(err) => error!(agent_id, error = %err, "failed to dispatch task request"),
        }
    }

    /// Every `agent_monitor_interval_seconds`, flags agents that have gone
    /// quiet past `agent_unresponsive_seconds` and broadcasts the refreshed
    /// system status to the fleet.
    async fn run_health_monitor(self: Arc<Self>) {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(self.config.agent_monitor_interval_seconds));
        loop {
            ticker.tick().await;
            let flagged = self
                .agents
                .sweep_unresponsive(self.config.agent_unresponsive_seconds)
                .await;
            for agent_id in &flagged {
                self.dashboard
                    .update_agent_status(agent_id, serde_json::json!({"status": "unresponsive"}))
                    .await;
            }
            let agents = self.agents.snapshot().await;
            self.dashboard.reconcile_agents(&agents).await;

            if !flagged.is_empty() {
                let status = self.snapshot_status().await;
                self.sessions
                    .broadcast_frame(&Frame::SystemStatusUpdate { status })
                    .await;
            }
        }
    }

    /// Drains shared-context update notifications and forwards each one to
    /// its target agent's live session, in the order they were accepted.
    async fn run_sync_forwarder(
        self: Arc<Self>,
        mut notify_rx: tokio::sync::mpsc::UnboundedReceiver<crate::sync::ContextNotification>,
    ) {
        while let Some(notification) = notify_rx.recv().await {
            let frame = Frame::ContextSync {
                agent_id: notification.updated_by,
                context: ContextSyncPayload {
                    key: notification.key,
                    value: notification.entry.value,
                    metadata: Some(notification.entry.metadata),
                },
            };
            self.sessions.send_frame(&notification.target_agent, &frame).await;
        }
    }

    async fn run_ws_listener(self: Arc<Self>) -> Result<()> {
        let app = Router::new()
            .route("/ws/agent", get(agent_ws_handler))
            .route("/tasks", post(submit_task))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.clone());

        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| CoordinatorError::Configuration(format!("bind {addr}: {e}")))?;
        info!(addr, "agent websocket listener started");
        axum::serve(listener, app)
            .await
            .map_err(|e| CoordinatorError::Internal(e.into()))
    }

    /// Runs the coordinator until one of its background tasks exits (which,
    /// outside of a fatal bind failure, should be never).
    pub async fn run(
        self: Arc<Self>,
        notify_rx: tokio::sync::mpsc::UnboundedReceiver<crate::sync::ContextNotification>,
    ) -> Result<()> {
        let health = tokio::spawn(self.clone().run_health_monitor());
        let sync_forwarder = tokio::spawn(self.clone().run_sync_forwarder(notify_rx));
        let ws_listener = self.clone().run_ws_listener();

        tokio::select! {
            result = ws_listener => result?,
            _ = health => {},
            _ = sync_forwarder => {},
        }
        Ok(())
    }

    pub async fn snapshot_status(&self) -> crate::protocol::SystemStatusPayload {
        let agents = self.agents.snapshot().await;
        let idle_agents = agents
            .iter()
            .filter(|a| a.status == crate::models::AgentStatus::Idle)
            .count();
        let active_agents = agents
            .iter()
            .filter(|a| a.status == crate::models::AgentStatus::Busy)
            .count();
        crate::protocol::SystemStatusPayload {
            total_agents: agents.len(),
            active_agents,
            idle_agents,
            tasks_in_queue: self.lifecycle.queue_depth().await,
            active_tasks: self.lifecycle.active_count().await,
            completed_tasks: self.lifecycle.completed_total() as usize,
        }
    }
}

async fn agent_ws_handler(
    ws: WebSocketUpgrade,
    State(coordinator): State<Arc<Coordinator>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| session::run_agent_session(coordinator, socket))
}

#[derive(Debug, Deserialize)]
struct SubmitTaskRequest {
    task_type: String,
    description: String,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    payload: Option<serde_json::Value>,
    #[serde(default)]
    estimated_duration: Option<f64>,
}

/// External task submission. Distinct from the dashboard's `/reports`
/// ingestion surface, which only ever updates `DashboardPublisher`'s own
/// view; this is the actual enqueue path into the lifecycle engine.
async fn submit_task(
    State(coordinator): State<Arc<Coordinator>>,
    Json(request): Json<SubmitTaskRequest>,
) -> impl IntoResponse {
    match coordinator
        .lifecycle
        .submit(
            request.task_type,
            request.description,
            request.priority,
            request.payload,
            request.estimated_duration,
        )
        .await
    {
        Ok(task) => (axum::http::StatusCode::ACCEPTED, Json::<Task>(task)).into_response(),
        Err(err) => {
            error!(error = %err, "task submission rejected");
            (axum::http::StatusCode::SERVICE_UNAVAILABLE, err.to_string()).into_response()
        }
    }
}
