//! Dashboard HTTP surface: a health check, a snapshot endpoint, the
//! `/reports` ingestion endpoint, and a push stream for subscribers. No
//! authentication middleware: the dashboard has no notion of end users.

use super::{DashboardPublisher, ReportEvent};
use crate::{CoordinatorError, Result};
use axum::{
    extract::ws::{Message, WebSocketUpgrade},
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

pub fn build_router(dashboard: DashboardPublisher) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/snapshot", get(snapshot))
        .route("/reports", post(ingest_report))
        .route("/ws/dashboard", get(dashboard_ws))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(dashboard)
}

pub async fn run(dashboard: DashboardPublisher, host: String, port: u16) -> Result<()> {
    let app = build_router(dashboard);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CoordinatorError::Configuration(format!("bind {addr}: {e}")))?;
    info!(addr, "dashboard http surface started");
    axum::serve(listener, app)
        .await
        .map_err(|e| CoordinatorError::Internal(e.into()))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "service": "agent-mesh-coordinator"}))
}

async fn snapshot(State(dashboard): State<DashboardPublisher>) -> Json<super::DashboardSnapshot> {
    Json(dashboard.snapshot().await)
}

/// Report ingestion. Deliberately disjoint from the agent-facing
/// WebSocket stream: this path only ever updates the dashboard's own view
/// (`DashboardPublisher::process_report`), never the lifecycle engine.
async fn ingest_report(
    State(dashboard): State<DashboardPublisher>,
    Json(event): Json<ReportEvent>,
) -> impl IntoResponse {
    dashboard.process_report(event).await;
    StatusCode::ACCEPTED
}

async fn dashboard_ws(
    ws: WebSocketUpgrade,
    State(dashboard): State<DashboardPublisher>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_dashboard_events(dashboard, socket))
}

async fn stream_dashboard_events(dashboard: DashboardPublisher, mut socket: axum::extract::ws::WebSocket) {
    use axum::extract::ws::Message as WsMessage;
    use futures_util::SinkExt;

    let snapshot = dashboard.snapshot().await;
    if let Ok(text) = serde_json::to_string(&snapshot) {
        if socket.send(WsMessage::Text(text.into())).await.is_err() {
            return;
        }
    }

    let mut events = dashboard.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let Ok(text) = serde_json::to_string(&event) else { continue };
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "dashboard subscriber lagged, events dropped");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                if incoming.is_none() {
                    break;
                }
            }
        }
    }
}
