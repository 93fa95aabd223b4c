//! Pooled connection state and the lease guard handed to callers.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Track creation time, last use and completed operations
//! - Return the connection to its pool when the lease is dropped

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::pool::manager::PoolShared;

/// Global atomic counter for connection IDs.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A logical connection owned by a [`ConnectionPool`](crate::pool::ConnectionPool).
#[derive(Debug)]
pub struct PooledConnection {
    id: ConnectionId,
    created_at: Instant,
    last_used: Instant,
    in_use: bool,
    operations: u64,
}

impl PooledConnection {
    /// Create an idle connection.
    pub fn new(id: ConnectionId) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_used: now,
            in_use: false,
            operations: 0,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    pub fn in_use(&self) -> bool {
        self.in_use
    }

    /// Number of leases this connection has completed.
    pub fn operations(&self) -> u64 {
        self.operations
    }

    /// Time since the connection was last returned (zero while leased).
    pub fn idle_for(&self, now: Instant) -> Duration {
        if self.in_use {
            Duration::ZERO
        } else {
            now.saturating_duration_since(self.last_used)
        }
    }

    pub(crate) fn mark_in_use(&mut self) {
        self.in_use = true;
    }

    pub(crate) fn mark_idle(&mut self) {
        self.in_use = false;
    }

    /// Record a completed lease.
    pub(crate) fn mark_released(&mut self) {
        self.in_use = false;
        self.last_used = Instant::now();
        self.operations += 1;
    }
}

/// Exclusive access to one pooled connection.
///
/// Dropping the lease releases the connection, on every exit path.
#[derive(Debug)]
pub struct PoolLease {
    connection: Option<PooledConnection>,
    pool: Arc<PoolShared>,
    waited: Duration,
}

impl PoolLease {
    pub(crate) fn new(connection: PooledConnection, pool: Arc<PoolShared>, waited: Duration) -> Self {
        Self {
            connection: Some(connection),
            pool,
            waited,
        }
    }

    /// The leased connection.
    pub fn connection(&self) -> &PooledConnection {
        self.connection
            .as_ref()
            .expect("lease holds its connection until dropped")
    }

    /// How long the acquire waited in the queue.
    pub fn waited(&self) -> Duration {
        self.waited
    }
}

impl Deref for PoolLease {
    type Target = PooledConnection;
    fn deref(&self) -> &Self::Target {
        self.connection()
    }
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.release_connection(connection);
        }
    }
}
