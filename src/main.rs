//! Backend Gateway CLI
//!
//! ```text
//!   operation ─▶ circuit check ─▶ cache ─▶ pool lease ─▶ retry ─▶ backend
//!                     ▲                                    │
//!                     └──────────── breaker update ◀──────┘
//! ```
//!
//! `check` validates a config file, `simulate` runs one batch against the
//! simulated backend and prints a JSON report, `run` keeps running batches
//! until interrupted, reloading the config file on change.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use backend_gateway::backend::{SimulatedBackend, SimulationProfile};
use backend_gateway::config::{load_config, ConfigWatcher, GatewayConfig};
use backend_gateway::lifecycle::{wait_for_shutdown_signal, Shutdown};
use backend_gateway::observability::{init_logging, metrics::init_metrics};
use backend_gateway::simulation::{run_batch, BatchOptions, SimulationReport};
use backend_gateway::{Gateway, MemoryCache, MetricsCollector};

#[derive(Parser)]
#[command(name = "backend-gateway")]
#[command(about = "Resilient backend access gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a config file and print the effective configuration
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run one batch against the simulated backend
    Simulate {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        workload: WorkloadArgs,
    },
    /// Run batches until interrupted, hot-reloading the config
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Pause between batches
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
        #[command(flatten)]
        workload: WorkloadArgs,
    },
}

#[derive(clap::Args, Debug, Clone)]
struct WorkloadArgs {
    #[arg(long, default_value_t = 200)]
    operations: usize,
    #[arg(long, default_value_t = 8)]
    concurrency: usize,
    /// Probability that a backend attempt fails
    #[arg(long, default_value_t = 0.05)]
    failure_rate: f64,
    /// Base backend latency
    #[arg(long, default_value_t = 5)]
    latency_ms: u64,
    /// Share of operations that are writes
    #[arg(long, default_value_t = 0.2)]
    write_ratio: f64,
}

impl WorkloadArgs {
    fn batch(&self) -> BatchOptions {
        BatchOptions {
            operations: self.operations,
            concurrency: self.concurrency,
            write_ratio: self.write_ratio.clamp(0.0, 1.0),
        }
    }

    fn profile(&self) -> SimulationProfile {
        SimulationProfile {
            failure_rate: self.failure_rate.clamp(0.0, 1.0),
            latency: Duration::from_millis(self.latency_ms),
            latency_jitter: Duration::from_millis(self.latency_ms / 2),
        }
    }
}

struct Harness {
    gateway: Arc<Gateway>,
    collector: Arc<MetricsCollector>,
    cache: Arc<MemoryCache>,
}

fn build_harness(config: &GatewayConfig, workload: &WorkloadArgs) -> Harness {
    let collector = Arc::new(MetricsCollector::new());
    let backend = Arc::new(SimulatedBackend::new(workload.profile()));
    let cache = Arc::new(MemoryCache::new());
    let gateway = Arc::new(Gateway::new(
        config,
        backend,
        Some(cache.clone()),
        collector.clone(),
    ));
    Harness {
        gateway,
        collector,
        cache,
    }
}

fn start_metrics(config: &GatewayConfig) {
    if !config.observability.metrics_enabled {
        return;
    }
    match config.observability.metrics_address.parse() {
        Ok(addr) => init_metrics(addr),
        Err(_) => tracing::error!(
            metrics_address = %config.observability.metrics_address,
            "Failed to parse metrics address"
        ),
    }
}

fn load_or_default(path: Option<&Path>) -> Result<GatewayConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => Ok(GatewayConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => {
            init_logging("warn");
            let config = load_config(&config)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Simulate { config, workload } => {
            let config = load_or_default(config.as_deref())?;
            init_logging(&config.observability.log_level);
            start_metrics(&config);

            let harness = build_harness(&config, &workload);
            let batch = run_batch(harness.gateway.clone(), &workload.batch()).await;
            let report = SimulationReport::new(&harness.gateway, batch, &harness.collector);
            harness.gateway.close().await;

            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Run {
            config: path,
            interval_ms,
            workload,
        } => {
            let config = load_config(&path)?;
            init_logging(&config.observability.log_level);
            start_metrics(&config);

            tracing::info!(
                target_name = %config.target.name,
                path = ?path,
                "backend-gateway v0.1.0 starting"
            );

            let harness = build_harness(&config, &workload);
            let (watcher, mut updates) = ConfigWatcher::new(&path);
            let _watcher = match watcher.starting_from(config.clone()).run() {
                Ok(w) => Some(w),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                    None
                }
            };

            let shutdown = Arc::new(Shutdown::new());
            let signal_shutdown = shutdown.clone();
            tokio::spawn(async move {
                wait_for_shutdown_signal().await;
                signal_shutdown.trigger();
            });

            let mut stop = shutdown.subscribe();
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            let batch = workload.batch();

            loop {
                tokio::select! {
                    _ = stop.recv() => break,
                    Some(new_config) = updates.recv() => {
                        if let Err(errors) = harness.gateway.apply_config(&new_config) {
                            for e in errors {
                                tracing::error!(error = %e, "Rejected reloaded config");
                            }
                        }
                    }
                    _ = ticker.tick() => {
                        let report = run_batch(harness.gateway.clone(), &batch).await;
                        let purged = harness.cache.purge_expired();
                        tracing::info!(
                            purged,
                            succeeded = report.succeeded,
                            failed = report.failed,
                            cache_hits = report.cache_hits,
                            pool_active = harness.gateway.pool_info().active,
                            "Round complete"
                        );
                    }
                }
            }

            tracing::info!("Shutting down");
            harness.gateway.close().await;
            let report = SimulationReport::new(
                &harness.gateway,
                Default::default(),
                &harness.collector,
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
            tracing::info!("Shutdown complete");
        }
    }

    Ok(())
}
