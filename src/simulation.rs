//! Batch driver used by the CLI's `simulate` and `run` commands.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::time::Instant;

use crate::backend::Operation;
use crate::gateway::{CallOptions, Gateway};
use crate::observability::metrics::{MetricsCollector, OperationSummary};
use crate::pool::PoolInfo;
use crate::resilience::CircuitStats;

/// Distinct read queries in the workload; small enough that reads repeat.
const READ_KEYSPACE: u64 = 16;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub operations: usize,
    pub concurrency: usize,
    /// Share of operations that are writes, in `[0, 1]`.
    pub write_ratio: f64,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            operations: 200,
            concurrency: 8,
            write_ratio: 0.2,
        }
    }
}

/// Outcome counts for one batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub operations: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cache_hits: usize,
    /// Failure count by error kind.
    pub errors: BTreeMap<String, usize>,
    pub elapsed_ms: u64,
}

/// Batch outcome plus gateway state afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub target: String,
    pub batch: BatchReport,
    pub pool: PoolInfo,
    pub circuit: Option<CircuitStats>,
    pub operations: BTreeMap<String, OperationSummary>,
}

impl SimulationReport {
    pub fn new(gateway: &Gateway, batch: BatchReport, collector: &MetricsCollector) -> Self {
        Self {
            target: gateway.target().to_string(),
            batch,
            pool: gateway.pool_info(),
            circuit: gateway.circuit_stats(),
            operations: collector.summaries().into_iter().collect(),
        }
    }
}

fn next_operation(target: &str, write_ratio: f64) -> Operation {
    if fastrand::f64() < write_ratio {
        Operation::write(target, "insert")
            .with_query("INSERT INTO events (payload) VALUES (?)")
            .with_param("payload", fastrand::u64(..))
    } else {
        Operation::read(target, "query")
            .with_query("SELECT * FROM accounts WHERE id = ?")
            .with_param("id", fastrand::u64(0..READ_KEYSPACE))
    }
}

/// Run `operations` calls spread over `concurrency` workers.
pub async fn run_batch(gateway: Arc<Gateway>, options: &BatchOptions) -> BatchReport {
    let started = Instant::now();
    let issued = Arc::new(AtomicUsize::new(0));
    let workers = options.concurrency.max(1);

    let handles = (0..workers).map(|_| {
        let gateway = gateway.clone();
        let issued = issued.clone();
        let total = options.operations;
        let write_ratio = options.write_ratio;

        async move {
            let mut report = BatchReport::default();
            while issued.fetch_add(1, Ordering::Relaxed) < total {
                let operation = next_operation(gateway.target(), write_ratio);
                report.operations += 1;
                match gateway.execute(&operation, CallOptions::default()).await {
                    Ok(outcome) => {
                        report.succeeded += 1;
                        if outcome.cache_hit {
                            report.cache_hits += 1;
                        }
                    }
                    Err(e) => {
                        report.failed += 1;
                        *report.errors.entry(e.kind().to_string()).or_default() += 1;
                    }
                }
            }
            report
        }
    });

    let mut total = BatchReport::default();
    for part in join_all(handles).await {
        total.operations += part.operations;
        total.succeeded += part.succeeded;
        total.failed += part.failed;
        total.cache_hits += part.cache_hits;
        for (kind, count) in part.errors {
            *total.errors.entry(kind).or_default() += count;
        }
    }
    total.elapsed_ms = started.elapsed().as_millis() as u64;

    tracing::info!(
        operations = total.operations,
        succeeded = total.succeeded,
        failed = total.failed,
        cache_hits = total.cache_hits,
        elapsed_ms = total.elapsed_ms,
        "Batch finished"
    );
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SimulatedBackend, SimulationProfile};
    use crate::cache::MemoryCache;
    use crate::config::GatewayConfig;
    use std::time::Duration;

    #[tokio::test]
    async fn test_batch_counts_every_operation() {
        let collector = Arc::new(MetricsCollector::new());
        let backend = Arc::new(SimulatedBackend::new(SimulationProfile {
            failure_rate: 0.0,
            latency: Duration::from_millis(1),
            latency_jitter: Duration::ZERO,
        }));
        let gateway = Arc::new(Gateway::new(
            &GatewayConfig::default(),
            backend.clone(),
            Some(Arc::new(MemoryCache::new())),
            collector.clone(),
        ));

        let options = BatchOptions {
            operations: 50,
            concurrency: 4,
            write_ratio: 0.0,
        };
        let report = run_batch(gateway.clone(), &options).await;

        assert_eq!(report.operations, 50);
        assert_eq!(report.succeeded, 50);
        assert_eq!(report.failed, 0);
        // Only READ_KEYSPACE distinct reads exist, the rest hit the cache
        // once populated.
        assert!(report.cache_hits > 0);
        assert_eq!(backend.calls() as usize + report.cache_hits, 50);

        let summary = SimulationReport::new(&gateway, report, &collector);
        assert_eq!(summary.operations["query"].calls, 50);
        assert!(summary.pool.total <= summary.pool.max_size);
        gateway.close().await;
    }
}
