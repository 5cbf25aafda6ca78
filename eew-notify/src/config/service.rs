//! Configuration service implementation.
//!
//! The ConfigService owns the currently active settings and swaps them atomically
//! on reload. Consumers take an `Arc` snapshot per evaluation, so a reload never
//! changes the settings seen by a dispatch that is already running.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::info;

use super::settings::AppConfig;
use crate::{Error, Result};

/// Broadcast channel capacity for config update events.
const CONFIG_EVENT_CAPACITY: usize = 16;

/// Event published after the active settings change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigUpdateEvent {
    /// Settings were re-read from the backing file.
    Reloaded,
}

/// Configuration service providing snapshot access to the active settings.
pub struct ConfigService {
    path: Option<PathBuf>,
    current: RwLock<Arc<AppConfig>>,
    event_tx: broadcast::Sender<ConfigUpdateEvent>,
}

impl ConfigService {
    /// Create a service around already-loaded settings. `reload` is unavailable.
    pub fn new(config: AppConfig) -> Self {
        Self::build(None, config)
    }

    /// Load settings from `path` and remember it for `reload`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let config = AppConfig::load(&path)?;
        Ok(Self::build(Some(path), config))
    }

    fn build(path: Option<PathBuf>, config: AppConfig) -> Self {
        let (event_tx, _) = broadcast::channel(CONFIG_EVENT_CAPACITY);
        Self {
            path,
            current: RwLock::new(Arc::new(config)),
            event_tx,
        }
    }

    /// Snapshot of the active settings.
    pub fn current(&self) -> Arc<AppConfig> {
        self.current.read().clone()
    }

    /// Re-read the settings file. On error the previous settings stay active.
    pub fn reload(&self) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| Error::config("settings were not loaded from a file"))?;
        let config = AppConfig::load(path)?;

        *self.current.write() = Arc::new(config);
        // Ignore errors - just means no subscribers currently
        let _ = self.event_tx.send(ConfigUpdateEvent::Reloaded);

        info!(path = %path.display(), "Settings reloaded");
        Ok(())
    }

    /// Subscribe to configuration update events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigUpdateEvent> {
        self.event_tx.subscribe()
    }
}
