//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_operations_total` (counter): by operation, outcome, cache
//! - `gateway_operation_duration_seconds` (histogram): by operation
//! - `gateway_pool_connections` (gauge): by target, state
//! - `gateway_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//!
//! The `metrics` macros are no-ops until a recorder is installed, so every
//! call here is safe with the exporter disabled.

use std::net::SocketAddr;
use std::time::Duration;

use dashmap::DashMap;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;

use crate::pool::PoolInfo;
use crate::resilience::CircuitMode;

/// One completed gateway call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationRecord {
    pub operation: String,
    pub duration_ms: u64,
    pub success: bool,
    pub cache_hit: bool,
}

impl OperationRecord {
    pub fn new(operation: impl Into<String>, duration: Duration, success: bool, cache_hit: bool) -> Self {
        Self {
            operation: operation.into(),
            duration_ms: duration.as_millis() as u64,
            success,
            cache_hit,
        }
    }
}

/// Receives exactly one record per gateway call.
pub trait MetricsSink: Send + Sync {
    fn record(&self, record: &OperationRecord);
}

/// Aggregated view of one operation name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperationSummary {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub cache_hits: u64,
    pub total_duration_ms: u64,
    pub max_duration_ms: u64,
}

impl OperationSummary {
    pub fn avg_duration_ms(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.calls as f64
        }
    }

    pub fn cache_hit_rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.calls as f64
        }
    }
}

/// Default sink: keeps per-operation summaries and mirrors every record
/// into the global metrics recorder.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    summaries: DashMap<String, OperationSummary>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self, operation: &str) -> Option<OperationSummary> {
        self.summaries.get(operation).map(|s| s.clone())
    }

    /// All summaries, sorted by operation name.
    pub fn summaries(&self) -> Vec<(String, OperationSummary)> {
        let mut all: Vec<_> = self
            .summaries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn total_calls(&self) -> u64 {
        self.summaries.iter().map(|s| s.calls).sum()
    }
}

impl MetricsSink for MetricsCollector {
    fn record(&self, record: &OperationRecord) {
        {
            let mut summary = self.summaries.entry(record.operation.clone()).or_default();
            summary.calls += 1;
            if record.success {
                summary.successes += 1;
            } else {
                summary.failures += 1;
            }
            if record.cache_hit {
                summary.cache_hits += 1;
            }
            summary.total_duration_ms += record.duration_ms;
            summary.max_duration_ms = summary.max_duration_ms.max(record.duration_ms);
        }
        record_operation(record);
    }
}

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_operation(record: &OperationRecord) {
    let outcome = if record.success { "success" } else { "failure" };
    let cache = if record.cache_hit { "hit" } else { "miss" };

    counter!(
        "gateway_operations_total",
        "operation" => record.operation.clone(),
        "outcome" => outcome,
        "cache" => cache
    )
    .increment(1);
    histogram!("gateway_operation_duration_seconds", "operation" => record.operation.clone())
        .record(record.duration_ms as f64 / 1000.0);
}

pub fn record_pool_info(info: &PoolInfo) {
    let target = info.target.clone();
    gauge!("gateway_pool_connections", "target" => target.clone(), "state" => "active")
        .set(info.active as f64);
    gauge!("gateway_pool_connections", "target" => target.clone(), "state" => "idle")
        .set(info.idle as f64);
    gauge!("gateway_pool_connections", "target" => target, "state" => "waiting")
        .set(info.waiting as f64);
}

pub fn record_circuit_state(target: &str, mode: CircuitMode) {
    let value = match mode {
        CircuitMode::Closed => 0.0,
        CircuitMode::HalfOpen => 1.0,
        CircuitMode::Open => 2.0,
    };
    gauge!("gateway_circuit_state", "target" => target.to_string()).set(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_aggregates_per_operation() {
        let collector = MetricsCollector::new();
        collector.record(&OperationRecord::new("query", Duration::from_millis(10), true, false));
        collector.record(&OperationRecord::new("query", Duration::from_millis(30), false, false));
        collector.record(&OperationRecord::new("query", Duration::from_millis(2), true, true));
        collector.record(&OperationRecord::new("insert", Duration::from_millis(5), true, false));

        let query = collector.summary("query").unwrap();
        assert_eq!(query.calls, 3);
        assert_eq!(query.successes, 2);
        assert_eq!(query.failures, 1);
        assert_eq!(query.cache_hits, 1);
        assert_eq!(query.max_duration_ms, 30);
        assert_eq!(query.avg_duration_ms(), 14.0);

        assert_eq!(collector.total_calls(), 4);
        let names: Vec<_> = collector.summaries().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["insert", "query"]);
    }

    #[test]
    fn test_empty_summary_rates() {
        let summary = OperationSummary::default();
        assert_eq!(summary.avg_duration_ms(), 0.0);
        assert_eq!(summary.cache_hit_rate(), 0.0);
    }
}
