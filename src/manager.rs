// src/manager.rs
use anyhow::{anyhow, bail, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::watch::{CycleReport, Watcher, WatcherStatus};

/// Grace period for a loop to finish its in-flight cycle on shutdown.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// Named registry of independent watchers.
#[derive(Default)]
pub struct WatcherManager {
    watchers: BTreeMap<String, Arc<Watcher>>,
}

impl WatcherManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, watcher: Watcher) -> Result<Arc<Watcher>> {
        let name = watcher.name().to_string();
        if self.watchers.contains_key(&name) {
            bail!("watcher `{name}` is already registered");
        }
        let w = Arc::new(watcher);
        self.watchers.insert(name.clone(), Arc::clone(&w));
        tracing::info!(watcher = %name, "registered watcher");
        Ok(w)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Watcher>> {
        self.watchers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.watchers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    fn require(&self, name: &str) -> Result<&Arc<Watcher>> {
        self.watchers
            .get(name)
            .ok_or_else(|| anyhow!("watcher `{name}` is not registered"))
    }

    pub fn start(&self, name: &str) -> Result<bool> {
        self.require(name)?.start()
    }

    pub fn stop(&self, name: &str) -> Result<bool> {
        self.require(name)?.stop()
    }

    pub async fn poll(&self, name: &str) -> Result<CycleReport> {
        Ok(self.require(name)?.poll_once().await)
    }

    /// Stop (waiting up to [`STOP_GRACE`]) and start again.
    pub async fn restart(&self, name: &str) -> Result<bool> {
        let w = self.require(name)?;
        stop_with_grace(w).await;
        w.start()
    }

    /// Start every watcher; the map holds `true` for each one now running.
    pub fn start_all(&self) -> BTreeMap<String, bool> {
        self.watchers
            .iter()
            .map(|(name, w)| {
                let ok = match w.start() {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::error!(watcher = %name, error = ?e, "failed to start watcher");
                        false
                    }
                };
                (name.clone(), ok)
            })
            .collect()
    }

    /// Signal every watcher to stop; the map holds `true` where the call succeeded.
    pub fn stop_all(&self) -> BTreeMap<String, bool> {
        self.watchers
            .iter()
            .map(|(name, w)| {
                let ok = match w.stop() {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::error!(watcher = %name, error = ?e, "failed to stop watcher");
                        false
                    }
                };
                (name.clone(), ok)
            })
            .collect()
    }

    /// Stop every watcher and wait for in-flight cycles, each bounded by
    /// [`STOP_GRACE`]. The map holds `true` for loops that exited in time.
    pub async fn stop_all_and_wait(&self) -> BTreeMap<String, bool> {
        let mut out = BTreeMap::new();
        for (name, w) in &self.watchers {
            out.insert(name.clone(), stop_with_grace(w).await);
        }
        out
    }

    pub fn statuses(&self) -> Vec<WatcherStatus> {
        self.watchers.values().map(|w| w.status()).collect()
    }

    /// name → running.
    pub fn health_check(&self) -> BTreeMap<String, bool> {
        self.watchers
            .iter()
            .map(|(name, w)| (name.clone(), w.is_running()))
            .collect()
    }
}

async fn stop_with_grace(w: &Watcher) -> bool {
    match tokio::time::timeout(STOP_GRACE, w.stop_and_wait()).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            tracing::error!(watcher = %w.name(), error = ?e, "watcher stop failed");
            false
        }
        Err(_) => {
            tracing::warn!(watcher = %w.name(), "watcher did not stop gracefully");
            false
        }
    }
}
