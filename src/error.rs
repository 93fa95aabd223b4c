//! Error taxonomy for gateway calls.

use std::time::Duration;

use thiserror::Error;

use crate::backend::BackendError;
use crate::pool::PoolError;

/// Errors surfaced by [`Gateway::execute`](crate::gateway::Gateway::execute).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// No connection became available within `connection_timeout`.
    #[error("connection pool for {target} timed out after {waited:?}")]
    PoolTimeout { target: String, waited: Duration },

    /// The pool was closed before a connection could be leased.
    #[error("connection pool for {0} is closed")]
    PoolClosed(String),

    /// The circuit breaker rejected the call.
    #[error("circuit breaker for {0} is open")]
    CircuitOpen(String),

    /// The backend executor failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Every permitted attempt failed.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: BackendError,
    },
}

impl GatewayError {
    /// Only transient backend failures are retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Backend(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Whether the error came from an actual backend attempt.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::Backend(_) | GatewayError::RetryExhausted { .. }
        )
    }

    /// Wrap a final backend error once the retry budget is spent.
    pub(crate) fn into_exhausted(self, attempts: u32) -> Self {
        match self {
            GatewayError::Backend(last) => GatewayError::RetryExhausted { attempts, last },
            other => other,
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::PoolTimeout { .. } => "pool_timeout",
            GatewayError::PoolClosed(_) => "pool_closed",
            GatewayError::CircuitOpen(_) => "circuit_open",
            GatewayError::Backend(_) => "backend",
            GatewayError::RetryExhausted { .. } => "retry_exhausted",
        }
    }
}

impl From<PoolError> for GatewayError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Timeout { target, waited } => GatewayError::PoolTimeout { target, waited },
            PoolError::Closed(target) => GatewayError::PoolClosed(target),
        }
    }
}
