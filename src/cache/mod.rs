//! Cache-aside subsystem.
//!
//! # Data Flow
//! ```text
//! Read-only operation:
//!     → aside.rs cache_key() (SHA-256 over the canonical operation JSON)
//!     → aside.rs lookup() → store.rs get()
//!         - fresh entry      → cache hit, backend skipped
//!         - stale / corrupt  → delete, treat as miss
//!     → backend call succeeds → aside.rs store() → store.rs set()
//! ```
//!
//! # Design Decisions
//! - Write operations never read or populate the cache
//! - Freshness is judged by the stored timestamp, independent of the store's own eviction
//! - Cache failures are logged and degrade to a miss; they never fail the call

pub mod aside;
pub mod store;

pub use aside::{cache_key, CacheAside, CacheEntry};
pub use store::{Cache, CacheError, MemoryCache};
