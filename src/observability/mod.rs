//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway calls, pools and breakers produce:
//!     → logging.rs (structured log events, request-id spans)
//!     → metrics.rs (counters, gauges, histograms + per-operation summaries)
//!
//! Consumers:
//!     → stdout log stream
//!     → Prometheus scrape endpoint (optional)
//!     → MetricsSink implementations supplied by the caller
//! ```

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{MetricsCollector, MetricsSink, OperationRecord, OperationSummary};
