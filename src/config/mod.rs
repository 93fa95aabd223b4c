//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated)
//!     → Gateway::new builds pool, breaker, retry and cache settings
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → Gateway::apply_config swaps the call policy
//! ```
//!
//! All fields have defaults so minimal files work.

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    CacheConfig, CircuitBreakerSettings, GatewayConfig, ObservabilityConfig, PoolSettings,
    RetryConfig, TargetConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
