//! Call options and results.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Per-call switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Skip the cache lookup. A successful read result is still stored.
    pub force: bool,
}

impl CallOptions {
    pub fn forced() -> Self {
        Self { force: true }
    }
}

/// Result of a successful call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallOutcome {
    pub request_id: Uuid,
    pub value: Value,
    pub cache_hit: bool,
    pub duration: Duration,
}

/// Progress marker for one call, reported when a call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStage {
    Start,
    CircuitCheck,
    CacheCheck,
    Acquire,
    Execute,
    Release,
    Record,
    Done,
}

impl std::fmt::Display for CallStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CallStage::Start => "start",
            CallStage::CircuitCheck => "circuit_check",
            CallStage::CacheCheck => "cache_check",
            CallStage::Acquire => "acquire",
            CallStage::Execute => "execute",
            CallStage::Release => "release",
            CallStage::Record => "record",
            CallStage::Done => "done",
        };
        f.write_str(name)
    }
}
