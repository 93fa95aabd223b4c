//! Operation descriptors and backend error definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Whether an operation only reads backend state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Idempotent; may be cached and retried.
    Read,
    /// Mutates backend state; never cached.
    Write,
}

/// Full description of one logical backend operation.
///
/// Parameters are kept in a `BTreeMap` so that serialization, and therefore
/// the derived cache key, does not depend on insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Logical backend target (e.g. a database name).
    pub target: String,
    /// Tool action (e.g. "query", "explain", "schema").
    pub action: String,
    /// Query text, if the action carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Bound parameters.
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    /// Read/write classification.
    pub kind: OperationKind,
}

impl Operation {
    /// Create a read-only operation.
    pub fn read(target: impl Into<String>, action: impl Into<String>) -> Self {
        Self::new(target, action, OperationKind::Read)
    }

    /// Create a state-changing operation.
    pub fn write(target: impl Into<String>, action: impl Into<String>) -> Self {
        Self::new(target, action, OperationKind::Write)
    }

    fn new(target: impl Into<String>, action: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            target: target.into(),
            action: action.into(),
            query: None,
            params: BTreeMap::new(),
            kind,
        }
    }

    /// Attach query text.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Bind a parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// True for operations that may consult and populate the cache.
    pub fn is_read_only(&self) -> bool {
        self.kind == OperationKind::Read
    }
}

/// Errors reported by a backend executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Backend could not be reached or refused service.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Backend did not answer in time.
    #[error("backend timed out: {0}")]
    Timeout(String),

    /// Backend rejected the operation itself (validation class).
    #[error("operation rejected: {0}")]
    Rejected(String),
}

impl BackendError {
    /// Transient failures are worth another attempt; rejections are not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, BackendError::Rejected(_))
    }
}
