// src/watch/scheduler.rs
use crate::watch::{Shared, Watcher, WatcherState};
use anyhow::{anyhow, Context, Result};
use metrics::gauge;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The currently spawned poll loop, if any.
#[derive(Default)]
pub(crate) struct LoopSlot(Mutex<Option<PollLoop>>);

pub(crate) struct PollLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollLoop {
    fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

impl Watcher {
    /// Spawn the poll loop on the current tokio runtime.
    ///
    /// Returns `Ok(false)` when the watcher is already running. The only error
    /// is calling this outside a runtime.
    pub fn start(&self) -> Result<bool> {
        let mut slot = self
            .running
            .0
            .lock()
            .map_err(|_| anyhow!("watcher `{}`: lifecycle lock poisoned", self.name()))?;

        if slot.as_ref().is_some_and(PollLoop::is_active) {
            tracing::debug!(watcher = %self.name(), "start ignored: already running");
            return Ok(false);
        }

        let rt = tokio::runtime::Handle::try_current()
            .with_context(|| format!("watcher `{}`: start needs a tokio runtime", self.name()))?;
        let cancel = CancellationToken::new();
        let handle = rt.spawn(run_loop(
            Arc::clone(&self.shared),
            self.poll_interval,
            cancel.clone(),
        ));
        *slot = Some(PollLoop { cancel, handle });

        gauge!("watcher_running", "watcher" => self.name().to_string()).set(1.0);
        tracing::info!(
            watcher = %self.name(),
            every_secs = self.poll_interval.as_secs_f64(),
            "watcher started"
        );
        Ok(true)
    }

    /// Signal the loop to exit. No new cycle begins after this returns; a
    /// cycle already executing is allowed to finish. Returns `Ok(false)` when
    /// the watcher was not running.
    pub fn stop(&self) -> Result<bool> {
        Ok(self.take_loop()?.is_some())
    }

    /// Like [`Watcher::stop`], then wait until the loop task has exited.
    pub async fn stop_and_wait(&self) -> Result<bool> {
        let Some(handle) = self.take_loop()? else {
            return Ok(false);
        };
        handle
            .await
            .map_err(|e| anyhow!("watcher `{}`: poll loop panicked: {e}", self.name()))?;
        Ok(true)
    }

    pub fn state(&self) -> WatcherState {
        match self.running.0.lock() {
            Ok(slot) if slot.as_ref().is_some_and(PollLoop::is_active) => WatcherState::Running,
            _ => WatcherState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == WatcherState::Running
    }

    fn take_loop(&self) -> Result<Option<JoinHandle<()>>> {
        let mut slot = self
            .running
            .0
            .lock()
            .map_err(|_| anyhow!("watcher `{}`: lifecycle lock poisoned", self.name()))?;
        let Some(running) = slot.take() else {
            return Ok(None);
        };
        let was_active = running.is_active();
        running.cancel.cancel();

        gauge!("watcher_running", "watcher" => self.name().to_string()).set(0.0);
        if was_active {
            tracing::info!(watcher = %self.name(), "watcher stopped");
        }
        Ok(Some(running.handle))
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.running.0.lock() {
            if let Some(running) = slot.take() {
                running.cancel.cancel();
            }
        }
    }
}

/// Cycle, then sleep `every`. `cancel` interrupts both the wait for the
/// seen-set lock (held by a manual poll) and the sleep, so no cycle begins
/// once `stop` has returned.
async fn run_loop(shared: Arc<Shared>, every: Duration, cancel: CancellationToken) {
    loop {
        let seen = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            guard = shared.seen.lock() => guard,
        };

        if shared.backlog_pending() {
            if let Err(e) = shared.prime_locked(seen).await {
                tracing::warn!(watcher = %shared.name(), error = ?e, "backlog priming failed");
            }
        } else {
            let report = shared.run_cycle(seen).await;
            tracing::info!(
                target: "watch",
                watcher = %shared.name(),
                fetched = report.fetched,
                persisted = report.persisted.len(),
                failed = report.failed.len(),
                skipped = report.skipped,
                source_error = report.source_error.is_some(),
                "poll tick"
            );
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(every) => {}
        }
    }
    tracing::debug!(watcher = %shared.name(), "poll loop exited");
}
