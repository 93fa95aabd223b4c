//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use backend_gateway::backend::{BackendError, BackendExecutor, Operation};
use backend_gateway::cache::MemoryCache;
use backend_gateway::config::GatewayConfig;
use backend_gateway::observability::{MetricsSink, OperationRecord};
use backend_gateway::pool::PooledConnection;
use backend_gateway::Gateway;

/// Executor that replays queued results, then falls back to a default.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<Value, BackendError>>>,
    fallback: Result<Value, BackendError>,
    delay: Duration,
    calls: AtomicU64,
}

impl ScriptedBackend {
    /// Always succeeds with `{"ok": true}`.
    pub fn healthy() -> Self {
        Self::with_fallback(Ok(json!({ "ok": true })))
    }

    /// Always fails with a retryable error.
    pub fn down() -> Self {
        Self::with_fallback(Err(BackendError::Unavailable("backend down".into())))
    }

    pub fn with_fallback(fallback: Result<Value, BackendError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicU64::new(0),
        }
    }

    pub fn then(self, result: Result<Value, BackendError>) -> Self {
        self.script.lock().unwrap().push_back(result);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendExecutor for ScriptedBackend {
    async fn execute(
        &self,
        _connection: &PooledConnection,
        _operation: &Operation,
    ) -> Result<Value, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Sink that keeps every record.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<OperationRecord>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<OperationRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl MetricsSink for RecordingSink {
    fn record(&self, record: &OperationRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

/// Small pool, fast timeouts, no retry delay to speak of.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.target.name = "test-db".into();
    config.pool.min_size = 0;
    config.pool.max_size = 2;
    config.pool.connection_timeout_ms = 200;
    config.retries.base_delay_ms = 1;
    config.retries.max_delay_ms = 10;
    config.circuit_breaker.threshold = 3;
    config.circuit_breaker.timeout_ms = 1_000;
    config.cache.ttl_secs = 60;
    config
}

pub struct TestGateway {
    pub gateway: Gateway,
    pub backend: Arc<ScriptedBackend>,
    pub cache: Arc<MemoryCache>,
    pub sink: Arc<RecordingSink>,
}

pub fn gateway(config: &GatewayConfig, backend: ScriptedBackend) -> TestGateway {
    let backend = Arc::new(backend);
    let cache = Arc::new(MemoryCache::new());
    let sink = Arc::new(RecordingSink::default());
    let gateway = Gateway::new(config, backend.clone(), Some(cache.clone()), sink.clone());
    TestGateway {
        gateway,
        backend,
        cache,
        sink,
    }
}

pub fn read(id: u64) -> Operation {
    Operation::read("test-db", "query")
        .with_query("SELECT * FROM users WHERE id = ?")
        .with_param("id", id)
}

pub fn write(id: u64) -> Operation {
    Operation::write("test-db", "update")
        .with_query("UPDATE users SET seen = 1 WHERE id = ?")
        .with_param("id", id)
}
