//! Backend executor capability.

use async_trait::async_trait;
use serde_json::Value;

use crate::backend::types::{BackendError, Operation};
use crate::pool::PooledConnection;

/// Executes operations against a concrete backend.
///
/// Implementations receive the pooled connection the gateway acquired for the
/// call. The connection is logical; drivers may key their own session state
/// off its id.
#[async_trait]
pub trait BackendExecutor: Send + Sync {
    /// Run one attempt of `operation`.
    async fn execute(
        &self,
        connection: &PooledConnection,
        operation: &Operation,
    ) -> Result<Value, BackendError>;
}
