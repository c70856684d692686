// src/vault/memory.rs
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::watch::types::{Item, ItemSink};

/// In-memory sink that records every write, in order. Can be told to fail the
/// next N writes of a given id.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub calls: Mutex<Vec<Item>>,
    failures: Mutex<HashMap<String, usize>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose first `times` writes of `id` fail.
    pub fn failing(id: impl Into<String>, times: usize) -> Self {
        let sink = Self::new();
        sink.fail_next(id, times);
        sink
    }

    pub fn fail_next(&self, id: impl Into<String>, times: usize) {
        self.failures
            .lock()
            .expect("memory sink mutex poisoned")
            .insert(id.into(), times);
    }

    pub fn written_ids(&self) -> Vec<String> {
        self.calls
            .lock()
            .expect("memory sink mutex poisoned")
            .iter()
            .map(|it| it.id.clone())
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.calls.lock().expect("memory sink mutex poisoned").len()
    }

    pub fn writes_of(&self, id: &str) -> usize {
        self.calls
            .lock()
            .expect("memory sink mutex poisoned")
            .iter()
            .filter(|it| it.id == id)
            .count()
    }
}

#[async_trait::async_trait]
impl ItemSink for MemorySink {
    async fn write(&self, item: &Item) -> Result<()> {
        {
            let mut failures = self.failures.lock().expect("memory sink mutex poisoned");
            if let Some(left) = failures.get_mut(&item.id) {
                if *left > 0 {
                    *left -= 1;
                    bail!("injected write failure for {}", item.id);
                }
            }
        }
        self.calls
            .lock()
            .expect("memory sink mutex poisoned")
            .push(item.clone());
        Ok(())
    }
}
