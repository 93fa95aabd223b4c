//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway call:
//!     → circuit_breaker.rs can_execute() (fail fast while open)
//!     → retries.rs run() (attempt, classify, back off, attempt again)
//!         → backoff.rs (base * 2^attempt, capped, optional jitter)
//!     → circuit_breaker.rs record_success()/record_failure() once per call
//! ```
//!
//! # Design Decisions
//! - Breaker state is per backend target, owned by the gateway for that target
//! - Open → half-open is evaluated lazily on the next check, not on a timer
//! - Retry counts attempts; the breaker counts calls. They never share a counter
//! - Circuit-open and pool errors are never retried

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitMode, CircuitStats};
pub use retries::RetryPolicy;
