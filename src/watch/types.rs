// src/watch/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One unit of external content (an email, a notification, a feed post).
/// `id` is the dedup key; everything else is payload the core never inspects.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub source: String, // e.g., "gmail", "linkedin"
    pub kind: String,   // e.g., "email", "notification", "post"
    pub received_at: DateTime<Utc>,
    pub title: String,
    pub sender: Option<String>,
    pub body: String,
    pub url: Option<String>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl Item {
    /// Bare item with an empty payload, received now.
    pub fn new(id: impl Into<String>, source: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            kind: kind.into(),
            received_at: Utc::now(),
            title: String::new(),
            sender: None,
            body: String::new(),
            url: None,
            meta: BTreeMap::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }
}

/// Yields the items currently available from an external service.
/// "Nothing new" is `Ok(vec![])`; `Err` means the fetch itself failed.
#[async_trait::async_trait]
pub trait ItemSource: Send + Sync {
    async fn fetch_candidates(&self) -> Result<Vec<Item>>;
    fn name(&self) -> &'static str;
}

/// Write-only durable destination. Writes must tolerate re-delivery of the
/// same item.
#[async_trait::async_trait]
pub trait ItemSink: Send + Sync {
    async fn write(&self, item: &Item) -> Result<()>;
}

/// Decides whether a not-yet-seen item gets recorded.
pub trait ItemFilter: Send + Sync {
    fn accept(&self, item: &Item) -> bool;
}

impl<F> ItemFilter for F
where
    F: Fn(&Item) -> bool + Send + Sync,
{
    fn accept(&self, item: &Item) -> bool {
        self(item)
    }
}

#[async_trait::async_trait]
impl<T: ItemSource + ?Sized> ItemSource for Arc<T> {
    async fn fetch_candidates(&self) -> Result<Vec<Item>> {
        (**self).fetch_candidates().await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

#[async_trait::async_trait]
impl<T: ItemSink + ?Sized> ItemSink for Arc<T> {
    async fn write(&self, item: &Item) -> Result<()> {
        (**self).write(item).await
    }
}
