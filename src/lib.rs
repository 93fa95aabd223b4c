//! Resilient backend access: pooled connections, circuit breaking, retries
//! and cache-aside reads behind a single per-target `Gateway`.

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod observability;
pub mod pool;
pub mod resilience;
pub mod simulation;

pub use backend::{BackendError, BackendExecutor, Operation, OperationKind};
pub use cache::{Cache, CacheAside, MemoryCache};
pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::{CallOptions, CallOutcome, Gateway};
pub use lifecycle::Shutdown;
pub use observability::{MetricsCollector, MetricsSink, OperationRecord};
pub use pool::{ConnectionPool, PoolConfig, PoolError, PoolLease};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitMode, RetryPolicy};
