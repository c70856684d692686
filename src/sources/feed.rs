use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::sources::plain_text;
use crate::watch::types::{Item, ItemSource};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}
#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Guid>,
    author: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}
#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text")]
    value: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), 0))
}

/// RSS 2.0 feed, fetched over HTTP or parsed from an in-memory document.
pub struct FeedSource {
    label: String,
    mode: Mode,
}

enum Mode {
    Document(String),
    Http { url: String, client: reqwest::Client },
}

impl FeedSource {
    pub fn from_document(label: impl Into<String>, xml: &str) -> Self {
        Self {
            label: label.into(),
            mode: Mode::Document(xml.to_string()),
        }
    }

    pub fn from_url(label: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            label: label.into(),
            mode: Mode::Http {
                url: url.into(),
                client: super::http_client()?,
            },
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn parse_items(&self, s: &str) -> Result<Vec<Item>> {
        let xml_clean = replace_html_only_entities(s);
        let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = plain_text(it.title.as_deref().unwrap_or_default());
            let body = plain_text(it.description.as_deref().unwrap_or_default());
            if title.is_empty() && body.is_empty() {
                continue;
            }
            let guid = it
                .guid
                .and_then(|g| g.value)
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty());
            let link = it
                .link
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty());
            let id = match guid.or_else(|| link.clone()) {
                Some(id) => id,
                None => content_id(&title, it.pub_date.as_deref().unwrap_or_default()),
            };

            let mut item = Item::new(id, self.label.clone(), "post")
                .with_title(if title.is_empty() { "(untitled)".to_string() } else { title })
                .with_body(body);
            if let Some(ts) = it.pub_date.as_deref().and_then(parse_rfc2822) {
                item.received_at = ts;
            }
            item.sender = it.author.map(|a| plain_text(&a)).filter(|a| !a.is_empty());
            item.url = link;
            out.push(item);
        }
        Ok(out)
    }
}

#[async_trait]
impl ItemSource for FeedSource {
    async fn fetch_candidates(&self) -> Result<Vec<Item>> {
        match &self.mode {
            Mode::Document(s) => self.parse_items(s),
            Mode::Http { url, client } => {
                let body = client
                    .get(url.as_str())
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .with_context(|| format!("feed http get {url}"))?
                    .text()
                    .await
                    .context("feed http .text()")?;
                self.parse_items(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        "feed"
    }
}

fn content_id(title: &str, pub_date: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n");
    hasher.update(pub_date.as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

/// Named HTML entities that feeds use but XML does not define.
const HTML_ONLY_ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&ndash;", "-"),
    ("&mdash;", "-"),
    ("&hellip;", "..."),
    ("&ldquo;", "\""),
    ("&rdquo;", "\""),
    ("&lsquo;", "'"),
    ("&rsquo;", "'"),
];

fn replace_html_only_entities(xml: &str) -> String {
    HTML_ONLY_ENTITIES
        .iter()
        .fold(xml.to_string(), |acc, (entity, text)| acc.replace(entity, text))
}
