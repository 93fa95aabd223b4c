//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and relationships
//! between fields. Every violation is reported, not just the first.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.target.name.trim().is_empty() {
        errors.push(ValidationError::new("target.name", "must not be empty"));
    }

    let pool = &config.pool;
    if pool.max_size == 0 {
        errors.push(ValidationError::new("pool.max_size", "must be greater than 0"));
    }
    if pool.min_size > pool.max_size {
        errors.push(ValidationError::new(
            "pool.min_size",
            format!("{} exceeds max_size {}", pool.min_size, pool.max_size),
        ));
    }
    for (field, value) in [
        ("pool.idle_timeout_ms", pool.idle_timeout_ms),
        ("pool.connection_timeout_ms", pool.connection_timeout_ms),
        ("pool.eviction_interval_ms", pool.eviction_interval_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    let retries = &config.retries;
    if retries.enabled && retries.max_retries == 0 {
        errors.push(ValidationError::new(
            "retries.max_retries",
            "must be at least 1 when retries are enabled",
        ));
    }
    if retries.base_delay_ms > retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            format!("{} exceeds max_delay_ms {}", retries.base_delay_ms, retries.max_delay_ms),
        ));
    }
    if !(0.0..=1.0).contains(&retries.jitter_ratio) {
        errors.push(ValidationError::new(
            "retries.jitter_ratio",
            format!("{} is outside 0.0 - 1.0", retries.jitter_ratio),
        ));
    }

    let breaker = &config.circuit_breaker;
    if breaker.enabled {
        if breaker.threshold == 0 {
            errors.push(ValidationError::new("circuit_breaker.threshold", "must be greater than 0"));
        }
        if breaker.success_threshold == 0 {
            errors.push(ValidationError::new(
                "circuit_breaker.success_threshold",
                "must be greater than 0",
            ));
        }
        if breaker.timeout_ms == 0 {
            errors.push(ValidationError::new("circuit_breaker.timeout_ms", "must be greater than 0"));
        }
    }

    if config.cache.enabled && config.cache.ttl_secs == 0 {
        errors.push(ValidationError::new("cache.ttl_secs", "must be greater than 0"));
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn test_reports_every_violation() {
        let mut config = GatewayConfig::default();
        config.pool.min_size = 5;
        config.pool.max_size = 3;
        config.pool.connection_timeout_ms = 0;
        config.retries.jitter_ratio = 1.5;
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "not-an-address".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "pool.min_size",
                "pool.connection_timeout_ms",
                "retries.jitter_ratio",
                "observability.metrics_address",
            ]
        );
    }

    #[test]
    fn test_disabled_sections_skip_checks() {
        let mut config = GatewayConfig::default();
        config.circuit_breaker.enabled = false;
        config.circuit_breaker.threshold = 0;
        config.cache.enabled = false;
        config.cache.ttl_secs = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_zero_max_size() {
        let mut config = GatewayConfig::default();
        config.pool.min_size = 0;
        config.pool.max_size = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "pool.max_size: must be greater than 0");
    }
}
