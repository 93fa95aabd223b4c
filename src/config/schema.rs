//! Configuration schema definitions.
//!
//! Every section derives Serde traits and has defaults, so an empty file is a
//! valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pool::PoolConfig;
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};

/// Root configuration for one gateway.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Backend target identity.
    pub target: TargetConfig,

    /// Connection pool sizing and timeouts.
    pub pool: PoolSettings,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Circuit breaker configuration.
    pub circuit_breaker: CircuitBreakerSettings,

    /// Cache-aside configuration.
    pub cache: CacheConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Name used in logs, metrics and cache keys.
    pub name: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            name: "primary-db".to_string(),
        }
    }
}

/// Pool configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolSettings {
    pub min_size: usize,
    pub max_size: usize,

    /// Idle time after which a connection above `min_size` is evicted.
    pub idle_timeout_ms: u64,

    /// Longest an acquire waits for a free connection.
    pub connection_timeout_ms: u64,

    /// Interval between idle sweeps.
    pub eviction_interval_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_size: 2,
            max_size: 10,
            idle_timeout_ms: 300_000,
            connection_timeout_ms: 5_000,
            eviction_interval_ms: 60_000,
        }
    }
}

impl PoolSettings {
    pub fn to_pool_config(&self) -> PoolConfig {
        PoolConfig {
            min_size: self.min_size,
            max_size: self.max_size,
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            connection_timeout: Duration::from_millis(self.connection_timeout_ms),
            eviction_interval: Duration::from_millis(self.eviction_interval_ms),
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries. When false each call makes one attempt.
    pub enabled: bool,

    /// Total attempts per call.
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Random extra delay as a share of the computed delay (0.0 - 1.0).
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 10_000,
            jitter_ratio: 0.0,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            enabled: self.enabled,
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter_ratio: self.jitter_ratio,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub enabled: bool,

    /// Consecutive failures that open the circuit.
    pub threshold: u32,

    /// Milliseconds after the last failure before the circuit half-opens.
    pub timeout_ms: u64,

    /// Half-open successes required to close.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 5,
            timeout_ms: 60_000,
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn to_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            threshold: self.threshold,
            timeout: Duration::from_millis(self.timeout_ms),
            success_threshold: self.success_threshold,
        }
    }
}

/// Cache-aside configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Freshness window for cached read results.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config, GatewayConfig::default());
        assert_eq!(config.pool.to_pool_config(), PoolConfig::default());
        assert_eq!(config.retries.to_policy(), RetryPolicy::default());
        assert_eq!(
            config.circuit_breaker.to_breaker_config(),
            CircuitBreakerConfig::default()
        );
    }

    #[test]
    fn test_partial_section() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [target]
            name = "orders"

            [pool]
            max_size = 4
            connection_timeout_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.target.name, "orders");
        assert_eq!(config.pool.max_size, 4);
        assert_eq!(config.pool.min_size, 2);
        assert_eq!(
            config.pool.to_pool_config().connection_timeout,
            Duration::from_millis(50)
        );
        assert!(config.cache.enabled);
    }
}
