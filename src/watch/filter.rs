// src/watch/filter.rs
use crate::watch::types::{Item, ItemFilter};

/// Records every new item.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ItemFilter for AcceptAll {
    fn accept(&self, _item: &Item) -> bool {
        true
    }
}

/// Keeps items whose title or body contains any of the configured keywords
/// (case-insensitive). An empty keyword list keeps everything.
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    keywords: Vec<String>,
}

impl KeywordFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

impl ItemFilter for KeywordFilter {
    fn accept(&self, item: &Item) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let title = item.title.to_lowercase();
        let body = item.body.to_lowercase();
        self.keywords
            .iter()
            .any(|k| title.contains(k.as_str()) || body.contains(k.as_str()))
    }
}
