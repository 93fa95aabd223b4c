//! Connection pool subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway call
//!     → manager.rs acquire()
//!         - idle connection?      → mark in-use, lease it
//!         - size < max_size?      → create, mark in-use, lease it
//!         - otherwise             → wait_queue.rs ticket with deadline
//!     → PoolLease dropped / released
//!         - oldest live ticket?   → hand the connection straight to it
//!         - otherwise             → back to the idle set
//!     → eviction task trims idle connections past idle_timeout (never below min_size)
//! ```
//!
//! # Design Decisions
//! - Connections are logical; the pool tracks identity and usage, executors own transport
//! - One synchronous mutex guards idle set, size and wait queue together so
//!   check-and-mark and release-to-waiter hand-off are a single step
//! - Waiters are served strictly FIFO
//! - Leases are drop guards; release cannot be forgotten

pub mod connection;
pub mod manager;
pub mod wait_queue;

pub use connection::{ConnectionId, PoolLease, PooledConnection};
pub use manager::{ConnectionPool, PoolConfig, PoolError, PoolInfo};
pub use wait_queue::{WaitQueue, WaitTicket};
