//! Backend access seam.
//!
//! # Data Flow
//! ```text
//! Tool builds an Operation (action + query + params + target)
//!     → gateway hands it to a BackendExecutor together with a pooled connection
//!     → executor returns a JSON payload or a BackendError
//! ```
//!
//! # Design Decisions
//! - The executor is injected; real drivers live in the surrounding tools
//! - Read/write classification travels with the operation, not the executor
//! - `simulated.rs` backs the CLI and integration tests

pub mod executor;
pub mod simulated;
pub mod types;

pub use executor::BackendExecutor;
pub use simulated::{SimulatedBackend, SimulationProfile};
pub use types::{BackendError, Operation, OperationKind};
