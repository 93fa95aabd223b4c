//! Request orchestration.
//!
//! # Data Flow
//! ```text
//! Gateway::execute(operation)
//!     → circuit check (fail fast while open)
//!     → cache lookup (read-only operations, unless forced)
//!     → pool acquire (lease)
//!     → retry-wrapped backend call (breaker told once)
//!     → cache store (fresh read results)
//!     → lease released (drop guard, every path)
//!     → metrics sink record (exactly once)
//! ```

pub mod client;
pub mod types;

pub use client::{CallPolicy, Gateway};
pub use types::{CallOptions, CallOutcome, CallStage};
