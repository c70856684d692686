// src/watch/mod.rs
pub mod config;
pub mod filter;
pub mod scheduler;
pub mod seen;
pub mod types;

use crate::watch::filter::AcceptAll;
use crate::watch::scheduler::LoopSlot;
use crate::watch::seen::SeenSet;
use crate::watch::types::{Item, ItemFilter, ItemSink, ItemSource};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::MutexGuard;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("watcher_cycles_total", "Poll cycles started.");
        describe_counter!(
            "watcher_items_fetched_total",
            "Candidate items returned by sources."
        );
        describe_counter!(
            "watcher_items_persisted_total",
            "Items written to the sink."
        );
        describe_counter!(
            "watcher_items_skipped_total",
            "Candidates skipped because their id was already seen."
        );
        describe_counter!(
            "watcher_items_filtered_total",
            "New items rejected by the item filter."
        );
        describe_counter!(
            "watcher_persist_errors_total",
            "Sink write failures (item retried next cycle)."
        );
        describe_counter!("watcher_source_errors_total", "Source fetch failures.");
        describe_counter!(
            "gmail_message_errors_total",
            "Gmail messages listed but not fetchable (skipped for the cycle)."
        );
        describe_histogram!("watcher_cycle_ms", "Poll cycle duration in milliseconds.");
        describe_gauge!(
            "watcher_last_cycle_ts",
            "Unix ts when the watcher last finished a cycle."
        );
        describe_gauge!("watcher_running", "1 while the poll loop is active.");
    });
}

/// Lifecycle state of a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatcherState {
    Stopped,
    Running,
}

/// Outcome of a single poll cycle.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub fetched: usize,
    /// Already seen, or repeated earlier in the same batch.
    pub skipped: usize,
    /// Rejected by the item filter.
    pub filtered: usize,
    pub persisted: Vec<String>,
    pub failed: Vec<String>,
    pub source_error: Option<String>,
    pub elapsed_ms: u64,
}

impl CycleReport {
    pub fn persisted_count(&self) -> usize {
        self.persisted.len()
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct WatcherStatus {
    pub name: String,
    pub source: String,
    pub state: WatcherState,
    pub poll_interval_secs: f64,
    pub seen: usize,
    pub cycles: u64,
    pub last_cycle: Option<CycleReport>,
}

/// State shared between the watcher handle and its poll loop.
pub(crate) struct Shared {
    name: String,
    source: Box<dyn ItemSource>,
    sink: Box<dyn ItemSink>,
    filter: Box<dyn ItemFilter>,
    // Held for the whole cycle, which keeps manual and scheduled cycles apart.
    seen: tokio::sync::Mutex<SeenSet>,
    seen_count: AtomicUsize,
    cycles: AtomicU64,
    skip_backlog: bool,
    primed: AtomicBool,
    last_report: Mutex<Option<CycleReport>>,
}

impl Shared {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn backlog_pending(&self) -> bool {
        self.skip_backlog && !self.primed.load(Ordering::SeqCst)
    }

    async fn poll_once(&self) -> CycleReport {
        let seen = self.seen.lock().await;
        self.run_cycle(seen).await
    }

    /// One cycle under an already acquired seen-set lock.
    pub(crate) async fn run_cycle(&self, mut seen: MutexGuard<'_, SeenSet>) -> CycleReport {
        ensure_metrics_described();

        let t0 = Instant::now();
        let mut report = CycleReport {
            started_at: Utc::now(),
            ..CycleReport::default()
        };
        let label = self.name.clone();
        counter!("watcher_cycles_total", "watcher" => label.clone()).increment(1);

        let candidates = match self.source.fetch_candidates().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    watcher = %self.name,
                    source = self.source.name(),
                    error = ?e,
                    "source fetch failed"
                );
                counter!("watcher_source_errors_total", "watcher" => label.clone()).increment(1);
                report.source_error = Some(format!("{e:#}"));
                drop(seen);
                return self.finish(report, t0);
            }
        };
        report.fetched = candidates.len();

        // Order-preserving selection of the items to persist.
        let mut batch_ids: HashSet<String> = HashSet::new();
        let mut fresh: Vec<Item> = Vec::with_capacity(candidates.len());
        for item in candidates {
            if seen.has(&item.id) || !batch_ids.insert(item.id.clone()) {
                report.skipped += 1;
                continue;
            }
            if !self.filter.accept(&item) {
                seen.mark(item.id);
                report.filtered += 1;
                continue;
            }
            fresh.push(item);
        }

        for item in fresh {
            match self.sink.write(&item).await {
                Ok(()) => {
                    // Mark only after the write is committed: at-least-once.
                    seen.mark(item.id.clone());
                    report.persisted.push(item.id);
                }
                Err(e) => {
                    tracing::warn!(
                        watcher = %self.name,
                        item_id = %item.id,
                        error = ?e,
                        "persist failed; item stays unseen"
                    );
                    counter!("watcher_persist_errors_total", "watcher" => label.clone())
                        .increment(1);
                    report.failed.push(item.id);
                }
            }
        }

        self.seen_count.store(seen.len(), Ordering::SeqCst);
        drop(seen);

        counter!("watcher_items_fetched_total", "watcher" => label.clone())
            .increment(report.fetched as u64);
        counter!("watcher_items_persisted_total", "watcher" => label.clone())
            .increment(report.persisted.len() as u64);
        counter!("watcher_items_skipped_total", "watcher" => label.clone())
            .increment(report.skipped as u64);
        counter!("watcher_items_filtered_total", "watcher" => label)
            .increment(report.filtered as u64);

        self.finish(report, t0)
    }

    fn finish(&self, mut report: CycleReport, t0: Instant) -> CycleReport {
        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        report.elapsed_ms = ms as u64;
        histogram!("watcher_cycle_ms", "watcher" => self.name.clone()).record(ms);
        gauge!("watcher_last_cycle_ts", "watcher" => self.name.clone())
            .set(Utc::now().timestamp().max(0) as f64);

        self.cycles.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_report.lock() {
            *last = Some(report.clone());
        }
        report
    }

    async fn prime(&self) -> Result<usize> {
        let seen = self.seen.lock().await;
        self.prime_locked(seen).await
    }

    pub(crate) async fn prime_locked(&self, mut seen: MutexGuard<'_, SeenSet>) -> Result<usize> {
        let candidates = self.source.fetch_candidates().await?;
        let added = seen.seed(candidates.into_iter().map(|it| it.id));
        self.seen_count.store(seen.len(), Ordering::SeqCst);
        self.primed.store(true, Ordering::SeqCst);
        tracing::info!(watcher = %self.name, added, "backlog marked as seen");
        Ok(added)
    }
}

/// Polls one item source and records new items into one sink.
pub struct Watcher {
    pub(crate) shared: Arc<Shared>,
    pub(crate) poll_interval: Duration,
    pub(crate) running: LoopSlot,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("name", &self.shared.name)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl Watcher {
    pub fn builder(name: impl Into<String>) -> WatcherBuilder {
        WatcherBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn source_name(&self) -> &'static str {
        self.shared.source.name()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Run exactly one fetch → filter → persist → mark-seen cycle, whatever
    /// the lifecycle state. Waits for an in-flight scheduled cycle first.
    pub async fn poll_once(&self) -> CycleReport {
        self.shared.poll_once().await
    }

    /// Mark everything the source currently returns as seen without writing it.
    pub async fn prime(&self) -> Result<usize> {
        self.shared.prime().await
    }

    /// Add historical identifiers to the tracker; returns how many were new.
    pub async fn seed<I, S>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = self.shared.seen.lock().await;
        let added = seen.seed(ids);
        self.shared.seen_count.store(seen.len(), Ordering::SeqCst);
        added
    }

    /// Whether `id` is in the tracker. Waits for an in-flight cycle.
    pub async fn has_seen(&self, id: &str) -> bool {
        self.shared.seen.lock().await.has(id)
    }

    pub fn seen_count(&self) -> usize {
        self.shared.seen_count.load(Ordering::SeqCst)
    }

    pub fn cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::SeqCst)
    }

    pub fn last_cycle(&self) -> Option<CycleReport> {
        self.shared.last_report.lock().ok().and_then(|g| g.clone())
    }

    pub fn status(&self) -> WatcherStatus {
        WatcherStatus {
            name: self.name().to_string(),
            source: self.source_name().to_string(),
            state: self.state(),
            poll_interval_secs: self.poll_interval.as_secs_f64(),
            seen: self.seen_count(),
            cycles: self.cycles(),
            last_cycle: self.last_cycle(),
        }
    }
}

/// Collects a watcher's collaborators and options; `build` validates them.
pub struct WatcherBuilder {
    name: String,
    source: Option<Box<dyn ItemSource>>,
    sink: Option<Box<dyn ItemSink>>,
    filter: Box<dyn ItemFilter>,
    poll_interval: Duration,
    seed_history: Vec<String>,
    skip_backlog: bool,
}

impl WatcherBuilder {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            sink: None,
            filter: Box::new(AcceptAll),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            seed_history: Vec::new(),
            skip_backlog: false,
        }
    }

    pub fn source(mut self, source: impl ItemSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn boxed_source(mut self, source: Box<dyn ItemSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn sink(mut self, sink: impl ItemSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn filter(mut self, filter: impl ItemFilter + 'static) -> Self {
        self.filter = Box::new(filter);
        self
    }

    pub fn poll_interval(mut self, every: Duration) -> Self {
        self.poll_interval = every;
        self
    }

    pub fn seed_history<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seed_history.extend(ids.into_iter().map(Into::into));
        self
    }

    /// On the first start, treat whatever the source already holds as seen.
    pub fn skip_backlog(mut self, yes: bool) -> Self {
        self.skip_backlog = yes;
        self
    }

    pub fn build(self) -> Result<Watcher> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            bail!("watcher name must not be empty");
        }
        let Some(source) = self.source else {
            bail!("watcher `{name}`: no item source configured");
        };
        let Some(sink) = self.sink else {
            bail!("watcher `{name}`: no persistence sink configured");
        };
        if self.poll_interval.is_zero() {
            bail!("watcher `{name}`: poll interval must be positive");
        }

        let seen = SeenSet::with_history(self.seed_history);
        let seen_count = seen.len();
        Ok(Watcher {
            shared: Arc::new(Shared {
                name,
                source,
                sink,
                filter: self.filter,
                seen: tokio::sync::Mutex::new(seen),
                seen_count: AtomicUsize::new(seen_count),
                cycles: AtomicU64::new(0),
                skip_backlog: self.skip_backlog,
                primed: AtomicBool::new(false),
                last_report: Mutex::new(None),
            }),
            poll_interval: self.poll_interval,
            running: LoopSlot::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::memory::MemorySink;

    struct Fixed(Vec<&'static str>);

    #[async_trait::async_trait]
    impl ItemSource for Fixed {
        async fn fetch_candidates(&self) -> Result<Vec<Item>> {
            Ok(self.0.iter().map(|id| Item::new(*id, "fixed", "post")).collect())
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    #[test]
    fn build_rejects_missing_parts() {
        let no_source = Watcher::builder("w").sink(MemorySink::new()).build();
        assert!(no_source.is_err());

        let no_sink = Watcher::builder("w").source(Fixed(vec![])).build();
        assert!(no_sink.is_err());

        let blank = Watcher::builder("  ")
            .source(Fixed(vec![]))
            .sink(MemorySink::new())
            .build();
        assert!(blank.is_err());

        let zero = Watcher::builder("w")
            .source(Fixed(vec![]))
            .sink(MemorySink::new())
            .poll_interval(Duration::ZERO)
            .build();
        assert!(zero.is_err());
    }

    #[tokio::test]
    async fn repeated_id_in_one_batch_is_written_once() {
        let sink = Arc::new(MemorySink::new());
        let w = Watcher::builder("w")
            .source(Fixed(vec!["a", "a", "b"]))
            .sink(sink.clone())
            .build()
            .unwrap();

        let r = w.poll_once().await;
        assert_eq!(r.fetched, 3);
        assert_eq!(r.skipped, 1);
        assert_eq!(r.persisted, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(sink.written_ids(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(w.seen_count(), 2);
        assert_eq!(w.cycles(), 1);
        assert_eq!(w.last_cycle(), Some(r));
    }

    #[tokio::test]
    async fn filtered_items_are_marked_seen_but_not_written() {
        let sink = Arc::new(MemorySink::new());
        let w = Watcher::builder("w")
            .source(Fixed(vec!["keep", "drop"]))
            .sink(sink.clone())
            .filter(|it: &Item| it.id != "drop")
            .build()
            .unwrap();

        let r1 = w.poll_once().await;
        assert_eq!(r1.filtered, 1);
        assert_eq!(r1.persisted, vec!["keep".to_string()]);
        assert!(w.has_seen("drop").await);

        let r2 = w.poll_once().await;
        assert_eq!(r2.skipped, 2);
        assert_eq!(r2.filtered, 0);
        assert_eq!(sink.write_count(), 1);
    }

    #[tokio::test]
    async fn prime_marks_backlog_without_writes() {
        let sink = Arc::new(MemorySink::new());
        let w = Watcher::builder("w")
            .source(Fixed(vec!["old1", "old2"]))
            .sink(sink.clone())
            .build()
            .unwrap();

        assert_eq!(w.prime().await.unwrap(), 2);
        let r = w.poll_once().await;
        assert!(r.persisted.is_empty());
        assert_eq!(sink.write_count(), 0);
    }
}
