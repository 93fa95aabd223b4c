//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: backend assumed down, calls fail fast
//! - Half-Open: probing whether the backend recovered, at most
//!   `success_threshold` trial calls in flight
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: first check at/after `timeout` since the last failure
//! Half-Open → Closed: `success_threshold` consecutive successes
//! Half-Open → Open: any failure
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::observability::metrics;

/// Breaker mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitMode {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitMode::Closed => write!(f, "closed"),
            CircuitMode::Open => write!(f, "open"),
            CircuitMode::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Breaker thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub threshold: u32,
    /// Time after the last failure before a trial is let through.
    pub timeout: Duration,
    /// Consecutive half-open successes that close the circuit.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

/// Mutable breaker state for one backend target.
#[derive(Debug, Clone)]
pub struct CircuitState {
    mode: CircuitMode,
    failure_count: u32,
    last_failure: Option<Instant>,
    half_open_successes: u32,
    half_open_in_flight: u32,
}

impl CircuitState {
    fn new() -> Self {
        Self {
            mode: CircuitMode::Closed,
            failure_count: 0,
            last_failure: None,
            half_open_successes: 0,
            half_open_in_flight: 0,
        }
    }

    pub fn mode(&self) -> CircuitMode {
        self.mode
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }

    pub fn half_open_successes(&self) -> u32 {
        self.half_open_successes
    }

    /// Trial calls admitted while half-open that have not reported back.
    pub fn half_open_in_flight(&self) -> u32 {
        self.half_open_in_flight
    }
}

/// Snapshot for observability.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStats {
    pub target: String,
    pub mode: CircuitMode,
    pub failure_count: u32,
    pub half_open_successes: u32,
    pub successes: u64,
    pub failures: u64,
    pub rejections: u64,
    pub times_opened: u64,
    pub ms_since_last_failure: Option<u64>,
}

/// Consecutive-failure circuit breaker for one backend target.
#[derive(Debug)]
pub struct CircuitBreaker {
    target: String,
    config: CircuitBreakerConfig,
    state: Mutex<CircuitState>,

    successes: AtomicU64,
    failures: AtomicU64,
    rejections: AtomicU64,
    times_opened: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(target: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            target: target.into(),
            config,
            state: Mutex::new(CircuitState::new()),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            times_opened: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitState> {
        self.state.lock().expect("circuit breaker mutex poisoned")
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn trial_limit(&self) -> u32 {
        self.config.success_threshold.max(1)
    }

    /// Whether a new attempt may proceed.
    ///
    /// While open, the first check made at or after `timeout` since the last
    /// failure moves the breaker to half-open and is admitted as a trial.
    /// Half-open admits at most `success_threshold` trials at once; every
    /// admitted trial must end in `record_success`, `record_failure` or
    /// `release_trial`.
    pub fn can_execute(&self) -> bool {
        let mut state = self.lock();
        match state.mode {
            CircuitMode::Closed => true,
            CircuitMode::HalfOpen => {
                if state.half_open_in_flight < self.trial_limit() {
                    state.half_open_in_flight += 1;
                    true
                } else {
                    self.rejections.fetch_add(1, Ordering::Relaxed);
                    false
                }
            }
            CircuitMode::Open => {
                let ready = state
                    .last_failure
                    .map_or(true, |at| at.elapsed() >= self.config.timeout);
                if ready {
                    state.half_open_successes = 0;
                    state.half_open_in_flight = 1;
                    self.transition(&mut state, CircuitMode::HalfOpen);
                    true
                } else {
                    self.rejections.fetch_add(1, Ordering::Relaxed);
                    false
                }
            }
        }
    }

    /// Give back an admission that ended without reaching the backend.
    pub fn release_trial(&self) {
        let mut state = self.lock();
        if state.mode == CircuitMode::HalfOpen {
            state.half_open_in_flight = state.half_open_in_flight.saturating_sub(1);
        }
    }

    /// Report a successful call.
    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        let mut state = self.lock();
        match state.mode {
            CircuitMode::Closed => state.failure_count = 0,
            CircuitMode::HalfOpen => {
                state.half_open_in_flight = state.half_open_in_flight.saturating_sub(1);
                state.half_open_successes += 1;
                if state.half_open_successes >= self.config.success_threshold {
                    state.failure_count = 0;
                    state.half_open_successes = 0;
                    state.half_open_in_flight = 0;
                    self.transition(&mut state, CircuitMode::Closed);
                }
            }
            CircuitMode::Open => {
                // A call admitted before the circuit opened finished late.
                tracing::debug!(target_name = %self.target, "Success reported while open, ignored");
            }
        }
    }

    /// Report a failed call.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        let mut state = self.lock();
        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure = Some(Instant::now());

        match state.mode {
            CircuitMode::Closed => {
                if state.failure_count >= self.config.threshold {
                    self.transition(&mut state, CircuitMode::Open);
                }
            }
            CircuitMode::HalfOpen => {
                state.half_open_successes = 0;
                state.half_open_in_flight = 0;
                self.transition(&mut state, CircuitMode::Open);
            }
            CircuitMode::Open => {}
        }
    }

    fn transition(&self, state: &mut CircuitState, to: CircuitMode) {
        let from = state.mode;
        state.mode = to;

        match to {
            CircuitMode::Open => {
                self.times_opened.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    target_name = %self.target,
                    from = %from,
                    failures = state.failure_count,
                    "Circuit opened"
                );
            }
            CircuitMode::HalfOpen => {
                tracing::info!(target_name = %self.target, "Circuit half-open, probing backend");
            }
            CircuitMode::Closed => {
                tracing::info!(target_name = %self.target, "Circuit closed, backend recovered");
            }
        }
        metrics::record_circuit_state(&self.target, to);
    }

    pub fn mode(&self) -> CircuitMode {
        self.lock().mode
    }

    /// Copy of the current state.
    pub fn state(&self) -> CircuitState {
        self.lock().clone()
    }

    pub fn stats(&self) -> CircuitStats {
        let state = self.state();
        CircuitStats {
            target: self.target.clone(),
            mode: state.mode,
            failure_count: state.failure_count,
            half_open_successes: state.half_open_successes,
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            times_opened: self.times_opened.load(Ordering::Relaxed),
            ms_since_last_failure: state.last_failure.map(|at| at.elapsed().as_millis() as u64),
        }
    }
}
