//! Bounded connection pool for one backend target.
//!
//! # Responsibilities
//! - Serve acquire/release with FIFO waiting and a hard wait deadline
//! - Keep concurrently leased connections at or below `max_size`
//! - Evict idle connections past `idle_timeout` without dropping below `min_size`
//! - Expose counts and wait statistics for observability

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::pool::connection::{ConnectionId, PoolLease, PooledConnection};
use crate::pool::wait_queue::WaitQueue;

/// Pool sizing and timing. Immutable once the pool is built.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Connections kept even when idle.
    pub min_size: usize,
    /// Upper bound on connections, leased or idle.
    pub max_size: usize,
    /// Idle age after which a connection may be evicted.
    pub idle_timeout: Duration,
    /// Maximum time `acquire()` waits in the queue.
    pub connection_timeout: Duration,
    /// Period of the background eviction sweep.
    pub eviction_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 2,
            max_size: 10,
            idle_timeout: Duration::from_secs(300),
            connection_timeout: Duration::from_secs(5),
            eviction_interval: Duration::from_secs(60),
        }
    }
}

/// Errors returned by [`ConnectionPool::acquire`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("timed out after {waited:?} waiting for a connection to {target}")]
    Timeout { target: String, waited: Duration },

    #[error("connection pool for {0} is closed")]
    Closed(String),
}

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolInfo {
    pub target: String,
    pub total: usize,
    pub active: usize,
    pub idle: usize,
    pub waiting: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub total_requests: u64,
    /// Requests served without queueing.
    pub immediate: u64,
    pub created: u64,
    /// Requests that had to queue.
    pub waited: u64,
    pub timeouts: u64,
    /// Connections passed directly from a release to a waiter.
    pub handoffs: u64,
    pub evicted: u64,
    pub avg_wait_ms: f64,
    /// Share of requests served without waiting (1.0 before any request).
    pub efficiency: f64,
}

#[derive(Debug, Default)]
struct PoolCounters {
    requests: AtomicU64,
    immediate: AtomicU64,
    created: AtomicU64,
    waited: AtomicU64,
    timeouts: AtomicU64,
    handoffs: AtomicU64,
    evicted: AtomicU64,
    wait_micros: AtomicU64,
    completed_waits: AtomicU64,
}

#[derive(Debug)]
struct PoolState {
    /// Idle connections; front has been idle longest.
    idle: VecDeque<PooledConnection>,
    /// Connections in existence, leased or idle.
    size: usize,
    waiters: WaitQueue,
    closed: bool,
}

/// State shared between the pool handle, its leases and the eviction task.
#[derive(Debug)]
pub(crate) struct PoolShared {
    target: String,
    config: PoolConfig,
    state: Mutex<PoolState>,
    counters: PoolCounters,
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().expect("pool state mutex poisoned")
    }

    /// Return a connection: straight to the oldest waiter, else to the idle set.
    pub(crate) fn release_connection(&self, mut connection: PooledConnection) {
        connection.mark_released();
        let mut state = self.lock();

        if state.closed {
            state.size = state.size.saturating_sub(1);
            tracing::debug!(target_name = %self.target, connection = %connection.id(), "Discarding connection released after close");
            return;
        }

        match state.waiters.hand_off(connection) {
            Ok(waited) => {
                self.counters.handoffs.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    target_name = %self.target,
                    waited_ms = waited.as_millis() as u64,
                    "Handed released connection to waiter"
                );
            }
            Err(connection) => state.idle.push_back(connection),
        }
    }

    fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let PoolState { idle, size, waiters, .. } = &mut *state;

        let abandoned = waiters.purge_abandoned();
        if abandoned > 0 {
            tracing::debug!(target_name = %self.target, abandoned, "Purged abandoned wait tickets");
        }

        let min_size = self.config.min_size;
        let idle_timeout = self.config.idle_timeout;
        let mut evicted = 0;
        idle.retain(|conn| {
            if *size > min_size && conn.idle_for(now) > idle_timeout {
                *size -= 1;
                evicted += 1;
                false
            } else {
                true
            }
        });

        if evicted > 0 {
            self.counters.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::debug!(
                target_name = %self.target,
                evicted,
                remaining = *size,
                "Evicted idle connections"
            );
        }
        evicted
    }

    fn record_wait(&self, waited: Duration) {
        self.counters
            .wait_micros
            .fetch_add(waited.as_micros() as u64, Ordering::Relaxed);
        self.counters.completed_waits.fetch_add(1, Ordering::Relaxed);
    }
}

/// A queued acquire. If the acquiring future is dropped while queued, the
/// ticket is withdrawn, and a connection already handed to it goes back to
/// the pool instead of vanishing with the receiver.
struct PendingAcquire {
    shared: Arc<PoolShared>,
    ticket: u64,
    receiver: oneshot::Receiver<PooledConnection>,
}

impl Drop for PendingAcquire {
    fn drop(&mut self) {
        self.shared.lock().waiters.cancel(self.ticket);
        self.receiver.close();
        if let Ok(connection) = self.receiver.try_recv() {
            tracing::debug!(
                target_name = %self.shared.target,
                connection = %connection.id(),
                "Acquire abandoned after hand-off, returning connection"
            );
            self.shared.release_connection(connection);
        }
    }
}

/// Bounded pool of logical connections for one backend target.
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Create a pool and pre-create `min_size` idle connections.
    pub fn new(target: impl Into<String>, mut config: PoolConfig) -> Self {
        let target = target.into();
        if config.max_size == 0 {
            tracing::warn!(target_name = %target, "max_size of 0 raised to 1");
            config.max_size = 1;
        }
        if config.min_size > config.max_size {
            tracing::warn!(
                target_name = %target,
                min_size = config.min_size,
                max_size = config.max_size,
                "min_size clamped to max_size"
            );
            config.min_size = config.max_size;
        }

        let idle: VecDeque<PooledConnection> = (0..config.min_size)
            .map(|_| PooledConnection::new(ConnectionId::new()))
            .collect();
        let counters = PoolCounters::default();
        counters.created.store(idle.len() as u64, Ordering::Relaxed);

        tracing::info!(
            target_name = %target,
            min_size = config.min_size,
            max_size = config.max_size,
            "Connection pool created"
        );

        Self {
            shared: Arc::new(PoolShared {
                target,
                state: Mutex::new(PoolState {
                    size: idle.len(),
                    idle,
                    waiters: WaitQueue::new(),
                    closed: false,
                }),
                config,
                counters,
            }),
        }
    }

    pub fn target(&self) -> &str {
        &self.shared.target
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Lease a connection, waiting up to `connection_timeout` when saturated.
    pub async fn acquire(&self) -> Result<PoolLease, PoolError> {
        let shared = &self.shared;
        let started = Instant::now();
        shared.counters.requests.fetch_add(1, Ordering::Relaxed);

        let (mut pending, deadline) = {
            let mut state = shared.lock();
            if state.closed {
                return Err(PoolError::Closed(shared.target.clone()));
            }

            if let Some(mut connection) = state.idle.pop_back() {
                connection.mark_in_use();
                shared.counters.immediate.fetch_add(1, Ordering::Relaxed);
                return Ok(PoolLease::new(connection, shared.clone(), Duration::ZERO));
            }

            if state.size < shared.config.max_size {
                state.size += 1;
                let mut connection = PooledConnection::new(ConnectionId::new());
                connection.mark_in_use();
                shared.counters.created.fetch_add(1, Ordering::Relaxed);
                shared.counters.immediate.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    target_name = %shared.target,
                    connection = %connection.id(),
                    size = state.size,
                    "Created new connection"
                );
                return Ok(PoolLease::new(connection, shared.clone(), Duration::ZERO));
            }

            let deadline = started + shared.config.connection_timeout;
            let (ticket, receiver) = state.waiters.enqueue(deadline);
            shared.counters.waited.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                target_name = %shared.target,
                ticket,
                waiting = state.waiters.len(),
                "Pool saturated, queueing acquire"
            );
            (
                PendingAcquire {
                    shared: shared.clone(),
                    ticket,
                    receiver,
                },
                deadline,
            )
        };

        match tokio::time::timeout_at(deadline, &mut pending.receiver).await {
            Ok(Ok(connection)) => {
                let waited = started.elapsed();
                shared.record_wait(waited);
                Ok(PoolLease::new(connection, shared.clone(), waited))
            }
            Ok(Err(_)) => Err(PoolError::Closed(shared.target.clone())),
            Err(_) => {
                let cancelled = shared.lock().waiters.cancel(pending.ticket);
                let waited = started.elapsed();
                if cancelled {
                    shared.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        target_name = %shared.target,
                        waited_ms = waited.as_millis() as u64,
                        "Timed out waiting for a connection"
                    );
                    return Err(PoolError::Timeout {
                        target: shared.target.clone(),
                        waited,
                    });
                }
                // A release handed us a connection in the same instant the deadline fired.
                match pending.receiver.try_recv() {
                    Ok(connection) => {
                        shared.record_wait(waited);
                        Ok(PoolLease::new(connection, shared.clone(), waited))
                    }
                    Err(_) => Err(PoolError::Closed(shared.target.clone())),
                }
            }
        }
    }

    /// Return a leased connection. Equivalent to dropping the lease.
    pub fn release(&self, lease: PoolLease) {
        drop(lease);
    }

    /// Run one eviction sweep now. Returns the number of connections removed.
    pub fn evict_idle(&self) -> usize {
        self.shared.evict_idle()
    }

    /// Start the periodic eviction sweep.
    ///
    /// The task stops on shutdown, when the pool closes, or when every pool
    /// handle and lease has been dropped.
    pub fn spawn_eviction(&self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let shared: Weak<PoolShared> = Arc::downgrade(&self.shared);
        let interval = self.shared.config.eviction_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(shared) = shared.upgrade() else { break };
                        if shared.lock().closed {
                            break;
                        }
                        shared.evict_idle();
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Eviction task received shutdown signal");
                        break;
                    }
                }
            }
        })
    }

    /// Drop idle connections and reject every queued acquire.
    pub fn close(&self) {
        let mut state = self.shared.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let dropped = state.idle.len();
        state.idle.clear();
        state.size -= dropped;
        let rejected = state.waiters.reject_all();

        tracing::info!(
            target_name = %self.shared.target,
            dropped,
            rejected,
            still_leased = state.size,
            "Connection pool closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Snapshot of counts and statistics.
    pub fn info(&self) -> PoolInfo {
        let (total, idle, waiting) = {
            let state = self.shared.lock();
            (state.size, state.idle.len(), state.waiters.len())
        };
        let c = &self.shared.counters;
        let requests = c.requests.load(Ordering::Relaxed);
        let immediate = c.immediate.load(Ordering::Relaxed);
        let completed_waits = c.completed_waits.load(Ordering::Relaxed);

        let avg_wait_ms = if completed_waits > 0 {
            c.wait_micros.load(Ordering::Relaxed) as f64 / completed_waits as f64 / 1000.0
        } else {
            0.0
        };
        let efficiency = if requests > 0 {
            immediate as f64 / requests as f64
        } else {
            1.0
        };

        PoolInfo {
            target: self.shared.target.clone(),
            total,
            active: total - idle,
            idle,
            waiting,
            min_size: self.shared.config.min_size,
            max_size: self.shared.config.max_size,
            total_requests: requests,
            immediate,
            created: c.created.load(Ordering::Relaxed),
            waited: c.waited.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
            handoffs: c.handoffs.load(Ordering::Relaxed),
            evicted: c.evicted.load(Ordering::Relaxed),
            avg_wait_ms,
            efficiency,
        }
    }
}
