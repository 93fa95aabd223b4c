//! Configuration file watcher for hot reload.
//!
//! Editors often emit several events for one save, so a reload is only
//! forwarded when the parsed config differs from the last one delivered.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;

/// Monitors the configuration file and sends every valid, changed version.
pub struct ConfigWatcher {
    path: PathBuf,
    last: Option<GatewayConfig>,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                last: None,
                update_tx,
            },
            update_rx,
        )
    }

    /// Config already in effect; an identical reload is not forwarded.
    pub fn starting_from(mut self, config: GatewayConfig) -> Self {
        self.last = Some(config);
        self
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let ConfigWatcher {
            path,
            mut last,
            update_tx,
        } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    if let Some(config) = reload(&path, &mut last) {
                        let _ = update_tx.send(config);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?watched, "Config watcher started");
        Ok(watcher)
    }
}

/// Load `path` and return it if valid and different from `last`.
fn reload(path: &Path, last: &mut Option<GatewayConfig>) -> Option<GatewayConfig> {
    match load_config(path) {
        Ok(config) if last.as_ref() == Some(&config) => {
            tracing::debug!(path = ?path, "Config file touched without changes");
            None
        }
        Ok(config) => {
            tracing::info!(path = ?path, "Config file changed, reloading");
            *last = Some(config.clone());
            Some(config)
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                "Failed to reload config, keeping current configuration"
            );
            None
        }
    }
}
