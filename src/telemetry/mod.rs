//! In-process telemetry: named rolling metrics, a bounded structured-event
//! ring, and threshold-based alerting. Deliberately NOT a metrics-exporter
//! integration (no Prometheus/StatsD wire format), just in-memory
//! aggregation the rest of the system can query directly.

use crate::constants::{TELEMETRY_EVENT_RING_CAPACITY, TELEMETRY_METRIC_WINDOW};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    GreaterThan,
    LessThan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Threshold {
    pub metric: String,
    pub comparison: Comparison,
    pub limit: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredEvent {
    pub name: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub fields: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSummary {
    pub count: usize,
    pub sum: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p95: f64,
}

#[derive(Debug, Default)]
struct MetricSeries {
    samples: VecDeque<f64>,
}

impl MetricSeries {
    fn record(&mut self, value: f64) {
        self.samples.push_back(value);
        while self.samples.len() > TELEMETRY_METRIC_WINDOW {
            self.samples.pop_front();
        }
    }

    fn summary(&self) -> MetricSummary {
        if self.samples.is_empty() {
            return MetricSummary {
                count: 0,
                sum: 0.0,
                avg: 0.0,
                min: 0.0,
                max: 0.0,
                p95: 0.0,
            };
        }
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();
        let p95_index = ((count as f64) * 0.95).ceil() as usize;
        let p95 = sorted[p95_index.saturating_sub(1).min(count - 1)];
        MetricSummary {
            count,
            sum,
            avg: sum / count as f64,
            min: sorted[0],
            max: sorted[count - 1],
            p95,
        }
    }
}

/// Shared handle; cheap to clone, all state behind one lock (metrics and
/// events are written together far less often than they're read, but both
/// are small enough that a single RwLock keeps this module simple).
#[derive(Clone)]
pub struct Telemetry {
    inner: Arc<RwLock<TelemetryInner>>,
}

#[derive(Default)]
struct TelemetryInner {
    metrics: HashMap<String, MetricSeries>,
    events: VecDeque<StructuredEvent>,
    thresholds: Vec<Threshold>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(TelemetryInner::default())),
        }
    }

    pub async fn record_metric(&self, name: &str, value: f64) {
        let mut inner = self.inner.write().await;
        inner
            .metrics
            .entry(name.to_string())
            .or_default()
            .record(value);

        let breach = inner.thresholds.iter().find_map(|t| {
            if t.metric != name {
                return None;
            }
            let breached = match t.comparison {
                Comparison::GreaterThan => value > t.limit,
                Comparison::LessThan => value < t.limit,
            };
            breached.then(|| t.clone())
        });
        if let Some(threshold) = breach {
            warn!(metric = name, value, limit = threshold.limit, "telemetry threshold breached");
            let mut fields = HashMap::new();
            fields.insert("metric".to_string(), serde_json::json!(name));
            fields.insert("value".to_string(), serde_json::json!(value));
            fields.insert("limit".to_string(), serde_json::json!(threshold.limit));
            Self::push_event(&mut inner, "threshold_breach", fields);
        }
    }

    pub async fn record_event(&self, name: &str, fields: HashMap<String, serde_json::Value>) {
        let mut inner = self.inner.write().await;
        Self::push_event(&mut inner, name, fields);
    }

    fn push_event(
        inner: &mut TelemetryInner,
        name: &str,
        fields: HashMap<String, serde_json::Value>,
    ) {
        inner.events.push_back(StructuredEvent {
            name: name.to_string(),
            timestamp: chrono::Utc::now(),
            fields,
        });
        while inner.events.len() > TELEMETRY_EVENT_RING_CAPACITY {
            inner.events.pop_front();
        }
    }

    pub async fn set_threshold(&self, threshold: Threshold) {
        self.inner.write().await.thresholds.push(threshold);
    }

    pub async fn metric_summary(&self, name: &str) -> MetricSummary {
        self.inner
            .read()
            .await
            .metrics
            .get(name)
            .map(|s| s.summary())
            .unwrap_or(MetricSummary {
                count: 0,
                sum: 0.0,
                avg: 0.0,
                min: 0.0,
                max: 0.0,
                p95: 0.0,
            })
    }

    pub async fn recent_events(&self, limit: usize) -> Vec<StructuredEvent> {
        let inner = self.inner.read().await;
        inner.events.iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_summarizes_metric() {
        let telemetry = Telemetry::new();
        telemetry.record_metric("task.duration", 1.0).await;
        telemetry.record_metric("task.duration", 3.0).await;
        let summary = telemetry.metric_summary("task.duration").await;
        assert_eq!(summary.count, 2);
        assert_eq!(summary.avg, 2.0);
    }

    #[tokio::test]
    async fn threshold_breach_emits_event() {
        let telemetry = Telemetry::new();
        telemetry
            .set_threshold(Threshold {
                metric: "queue.length".to_string(),
                comparison: Comparison::GreaterThan,
                limit: 10.0,
            })
            .await;
        telemetry.record_metric("queue.length", 20.0).await;
        let events = telemetry.recent_events(10).await;
        assert!(events.iter().any(|e| e.name == "threshold_breach"));
    }
}
