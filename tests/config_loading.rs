//! Loading gateway configuration from disk.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use backend_gateway::config::{load_config, ConfigError};
use backend_gateway::gateway::CallOptions;
use backend_gateway::Gateway;

mod common;
use common::{read, RecordingSink, ScriptedBackend};

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_full_file_round_trips_into_runtime_settings() {
    let file = write_config(
        r#"
        [target]
        name = "orders-db"

        [pool]
        min_size = 1
        max_size = 4
        idle_timeout_ms = 30000
        connection_timeout_ms = 250
        eviction_interval_ms = 5000

        [retries]
        enabled = true
        max_retries = 4
        base_delay_ms = 50
        max_delay_ms = 1000
        jitter_ratio = 0.1

        [circuit_breaker]
        enabled = true
        threshold = 3
        timeout_ms = 15000
        success_threshold = 1

        [cache]
        enabled = true
        ttl_secs = 30

        [observability]
        log_level = "debug"
        metrics_enabled = true
        metrics_address = "127.0.0.1:9191"
        "#,
    );

    let config = load_config(file.path()).unwrap();

    let pool = config.pool.to_pool_config();
    assert_eq!(pool.max_size, 4);
    assert_eq!(pool.connection_timeout, Duration::from_millis(250));
    assert_eq!(pool.eviction_interval, Duration::from_secs(5));

    let retry = config.retries.to_policy();
    assert_eq!(retry.max_attempts(), 4);
    assert_eq!(retry.base_delay, Duration::from_millis(50));

    let breaker = config.circuit_breaker.to_breaker_config();
    assert_eq!(breaker.threshold, 3);
    assert_eq!(breaker.success_threshold, 1);
    assert_eq!(config.cache.ttl(), Duration::from_secs(30));
    assert_eq!(config.observability.log_level, "debug");
}

#[test]
fn test_invalid_file_reports_all_problems() {
    let file = write_config(
        r#"
        [pool]
        min_size = 8
        max_size = 4

        [circuit_breaker]
        threshold = 0
        "#,
    );

    match load_config(file.path()) {
        Err(ConfigError::Validation(errors)) => {
            let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
            assert_eq!(fields, vec!["pool.min_size", "circuit_breaker.threshold"]);
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
fn test_unknown_types_fail_to_parse() {
    let file = write_config("[pool]\nmax_size = \"ten\"\n");
    assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
}

#[tokio::test]
async fn test_loaded_config_drives_gateway() {
    let file = write_config("[target]\nname = \"reports\"\n[retries]\nenabled = false\n");
    let config = load_config(file.path()).unwrap();

    let backend = Arc::new(ScriptedBackend::healthy());
    let sink = Arc::new(RecordingSink::default());
    let gateway = Gateway::new(&config, backend.clone(), None, sink.clone());

    let outcome = gateway.execute(&read(1), CallOptions::default()).await.unwrap();
    assert!(!outcome.cache_hit, "no cache store configured");
    assert_eq!(gateway.target(), "reports");
    assert_eq!(gateway.pool_info().min_size, 2);
    assert!(!gateway.policy().retry.enabled);
    assert_eq!(sink.records().len(), 1);

    gateway.close().await;
}
