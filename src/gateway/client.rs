//! The per-target gateway.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::backend::{BackendExecutor, Operation};
use crate::cache::{cache_key, Cache, CacheAside};
use crate::config::{validate_config, GatewayConfig, ValidationError};
use crate::error::GatewayError;
use crate::gateway::types::{CallOptions, CallOutcome, CallStage};
use crate::lifecycle::Shutdown;
use crate::observability::metrics::{self, MetricsSink, OperationRecord};
use crate::pool::{ConnectionPool, PoolInfo};
use crate::resilience::{CircuitBreaker, CircuitStats, RetryPolicy};

/// Settings that can change while the gateway runs.
#[derive(Debug, Clone, PartialEq)]
pub struct CallPolicy {
    pub retry: RetryPolicy,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
}

impl CallPolicy {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            retry: config.retries.to_policy(),
            cache_enabled: config.cache.enabled,
            cache_ttl: config.cache.ttl(),
        }
    }
}

/// Resilient access to one logical backend target.
///
/// Must be created inside a Tokio runtime; construction starts the pool's
/// eviction task.
pub struct Gateway {
    target: String,
    pool: ConnectionPool,
    breaker: Option<CircuitBreaker>,
    policy: ArcSwap<CallPolicy>,
    /// Config the pool and breaker were built from.
    config: ArcSwap<GatewayConfig>,
    cache: Option<CacheAside>,
    executor: Arc<dyn BackendExecutor>,
    sink: Arc<dyn MetricsSink>,
    shutdown: Shutdown,
    eviction: Mutex<Option<JoinHandle<()>>>,
}

impl Gateway {
    pub fn new(
        config: &GatewayConfig,
        executor: Arc<dyn BackendExecutor>,
        cache: Option<Arc<dyn Cache>>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        let target = config.target.name.clone();
        let pool = ConnectionPool::new(target.clone(), config.pool.to_pool_config());
        let breaker = config
            .circuit_breaker
            .enabled
            .then(|| CircuitBreaker::new(target.clone(), config.circuit_breaker.to_breaker_config()));

        let shutdown = Shutdown::new();
        let eviction = pool.spawn_eviction(shutdown.subscribe());

        tracing::info!(
            target_name = %target,
            breaker = breaker.is_some(),
            cache = cache.is_some() && config.cache.enabled,
            retries = config.retries.enabled,
            "Gateway started"
        );

        Self {
            target,
            pool,
            breaker,
            policy: ArcSwap::from_pointee(CallPolicy::from_config(config)),
            config: ArcSwap::from_pointee(config.clone()),
            cache: cache.map(CacheAside::new),
            executor,
            sink,
            shutdown,
            eviction: Mutex::new(Some(eviction)),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_ref()
    }

    pub fn policy(&self) -> Arc<CallPolicy> {
        self.policy.load_full()
    }

    pub fn pool_info(&self) -> PoolInfo {
        self.pool.info()
    }

    pub fn circuit_stats(&self) -> Option<CircuitStats> {
        self.breaker.as_ref().map(CircuitBreaker::stats)
    }

    /// Run one operation through circuit check, cache, pool and retries.
    pub async fn execute(
        &self,
        operation: &Operation,
        options: CallOptions,
    ) -> Result<CallOutcome, GatewayError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "gateway_call",
            request_id = %request_id,
            target_name = %self.target,
            action = %operation.action,
        );

        async move {
            let started = Instant::now();
            let mut stage = CallStage::Start;
            let result = self.run_stages(operation, options, &mut stage).await;
            let failed_at = stage;

            stage = CallStage::Record;
            tracing::trace!(stage = %stage, "Recording outcome");
            let duration = started.elapsed();
            let cache_hit = matches!(result, Ok((_, true)));
            self.sink.record(&OperationRecord::new(
                operation.action.clone(),
                duration,
                result.is_ok(),
                cache_hit,
            ));
            metrics::record_pool_info(&self.pool.info());

            match result {
                Ok((value, cache_hit)) => {
                    tracing::debug!(
                        duration_ms = duration.as_millis() as u64,
                        cache_hit,
                        "Call completed"
                    );
                    Ok(CallOutcome {
                        request_id,
                        value,
                        cache_hit,
                        duration,
                    })
                }
                Err(error) => {
                    tracing::warn!(
                        duration_ms = duration.as_millis() as u64,
                        stage = %failed_at,
                        error = %error,
                        kind = error.kind(),
                        "Call failed"
                    );
                    Err(error)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_stages(
        &self,
        operation: &Operation,
        options: CallOptions,
        stage: &mut CallStage,
    ) -> Result<(Value, bool), GatewayError> {
        let policy = self.policy.load_full();

        *stage = CallStage::CircuitCheck;
        if let Some(breaker) = &self.breaker {
            if !breaker.can_execute() {
                tracing::debug!(stage = %stage, "Rejected by open circuit");
                return Err(GatewayError::CircuitOpen(self.target.clone()));
            }
        }
        let mut admission = Admission {
            breaker: self.breaker.as_ref(),
            reported: false,
        };

        *stage = CallStage::CacheCheck;
        let cache = self
            .cache
            .as_ref()
            .filter(|_| policy.cache_enabled && operation.is_read_only());
        let key = cache.map(|_| cache_key(operation));
        if let (Some(cache), Some(key)) = (cache, key.as_deref()) {
            if options.force {
                tracing::debug!(key = %key, "Cache lookup bypassed");
            } else if let Some(value) = cache.lookup(key).await {
                tracing::debug!(key = %key, "Cache hit");
                return Ok((value, true));
            }
        }

        *stage = CallStage::Acquire;
        let lease = self.pool.acquire().await.map_err(|e| {
            tracing::debug!(stage = %stage, error = %e, "Acquire failed");
            GatewayError::from(e)
        })?;
        tracing::debug!(
            connection = %lease.id(),
            waited_ms = lease.waited().as_millis() as u64,
            "Connection leased"
        );

        *stage = CallStage::Execute;
        let connection = lease.connection();
        let executor = self.executor.as_ref();
        let result = policy
            .retry
            .run(self.breaker.as_ref(), move |attempt| async move {
                tracing::debug!(attempt, connection = %connection.id(), "Executing operation");
                executor
                    .execute(connection, operation)
                    .await
                    .map_err(GatewayError::from)
            })
            .await;
        admission.reported = match &result {
            Ok(_) => true,
            Err(e) => e.is_backend_failure(),
        };
        let value = result?;

        if let (Some(cache), Some(key)) = (cache, key.as_deref()) {
            cache.store(key, &value, policy.cache_ttl).await;
        }

        *stage = CallStage::Release;
        self.pool.release(lease);

        *stage = CallStage::Done;
        Ok((value, false))
    }

    /// Swap in reloadable settings from a new config.
    ///
    /// Retry and cache settings apply to the next call. Pool and breaker
    /// settings are fixed at construction; changes to them are reported and
    /// ignored.
    pub fn apply_config(&self, config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
        validate_config(config)?;

        let current = self.config.load_full();
        if config.target != current.target {
            tracing::warn!(
                current = %current.target.name,
                requested = %config.target.name,
                "Target name cannot change at runtime, ignored"
            );
        }
        if config.pool != current.pool {
            tracing::warn!(target_name = %self.target, "Pool settings require a restart, ignored");
        }
        if config.circuit_breaker != current.circuit_breaker {
            tracing::warn!(
                target_name = %self.target,
                "Circuit breaker settings require a restart, ignored"
            );
        }

        let policy = CallPolicy::from_config(config);
        if *self.policy.load_full() != policy {
            tracing::info!(
                target_name = %self.target,
                retries = policy.retry.enabled,
                max_retries = policy.retry.max_retries,
                cache = policy.cache_enabled,
                ttl_secs = policy.cache_ttl.as_secs(),
                "Call policy updated"
            );
            self.policy.store(Arc::new(policy));
        }
        Ok(())
    }

    /// Stop background work and close the pool.
    pub async fn close(&self) {
        self.shutdown.trigger();
        self.pool.close();

        let handle = self
            .eviction
            .lock()
            .expect("gateway eviction mutex poisoned")
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Eviction task ended abnormally");
            }
        }
        tracing::info!(target_name = %self.target, "Gateway closed");
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

/// Breaker admission held for one call. Dropped without a reported outcome
/// (cache hit, pool error, cancelled call) it hands the trial slot back.
struct Admission<'a> {
    breaker: Option<&'a CircuitBreaker>,
    reported: bool,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.reported {
            if let Some(breaker) = self.breaker {
                breaker.release_trial();
            }
        }
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("target", &self.target)
            .field("pool", &self.pool.info())
            .field("breaker", &self.breaker.as_ref().map(CircuitBreaker::mode))
            .finish_non_exhaustive()
    }
}
