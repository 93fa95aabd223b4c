//! Simulated backend for local runs and failure injection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::backend::executor::BackendExecutor;
use crate::backend::types::{BackendError, Operation};
use crate::pool::PooledConnection;

/// Behaviour knobs for [`SimulatedBackend`].
#[derive(Debug, Clone)]
pub struct SimulationProfile {
    /// Probability in `[0, 1]` that an attempt fails with `Unavailable`.
    pub failure_rate: f64,
    /// Fixed latency added to every attempt.
    pub latency: Duration,
    /// Upper bound of random extra latency.
    pub latency_jitter: Duration,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            failure_rate: 0.0,
            latency: Duration::from_millis(5),
            latency_jitter: Duration::from_millis(5),
        }
    }
}

/// Backend that fabricates row counts and fails at a configured rate.
#[derive(Debug, Default)]
pub struct SimulatedBackend {
    profile: SimulationProfile,
    calls: AtomicU64,
    failures: AtomicU64,
}

impl SimulatedBackend {
    pub fn new(profile: SimulationProfile) -> Self {
        Self {
            profile,
            calls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Attempts received so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Attempts that were failed on purpose.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn latency(&self) -> Duration {
        let jitter_ms = self.profile.latency_jitter.as_millis() as u64;
        let extra = if jitter_ms > 0 {
            fastrand::u64(0..=jitter_ms)
        } else {
            0
        };
        self.profile.latency + Duration::from_millis(extra)
    }
}

#[async_trait]
impl BackendExecutor for SimulatedBackend {
    async fn execute(
        &self,
        connection: &PooledConnection,
        operation: &Operation,
    ) -> Result<Value, BackendError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if operation.action.trim().is_empty() {
            return Err(BackendError::Rejected("empty action".to_string()));
        }

        tokio::time::sleep(self.latency()).await;

        if fastrand::f64() < self.profile.failure_rate {
            self.failures.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                target_name = %operation.target,
                connection = %connection.id(),
                "Injected backend failure"
            );
            return Err(BackendError::Unavailable(format!(
                "simulated outage on {}",
                operation.target
            )));
        }

        Ok(json!({
            "target": operation.target,
            "action": operation.action,
            "connection": connection.id().as_u64(),
            "rows": fastrand::u32(0..500),
        }))
    }
}
