// src/watch/seen.rs
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Identifiers a watcher has already processed, with the time each was first
/// observed. Only ever grows.
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    inner: HashMap<String, DateTime<Utc>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker pre-populated with historical identifiers.
    pub fn with_history<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        set.seed(ids);
        set
    }

    pub fn has(&self, id: &str) -> bool {
        self.inner.contains_key(id)
    }

    /// Returns `true` if `id` was not seen before. An existing entry keeps its
    /// original timestamp.
    pub fn mark(&mut self, id: impl Into<String>) -> bool {
        self.mark_at(id, Utc::now())
    }

    pub fn mark_at(&mut self, id: impl Into<String>, at: DateTime<Utc>) -> bool {
        let mut fresh = false;
        self.inner.entry(id.into()).or_insert_with(|| {
            fresh = true;
            at
        });
        fresh
    }

    /// Bulk insert; returns how many identifiers were new.
    pub fn seed<I, S>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = Utc::now();
        ids.into_iter()
            .map(|id| self.mark_at(id, now))
            .filter(|fresh| *fresh)
            .count()
    }

    pub fn seen_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.inner.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(String::as_str)
    }
}
