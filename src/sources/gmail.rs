//! Gmail inbox source.
//!
//! Lists the newest message ids under a label and fetches each message in
//! `full` format. Auth is an OAuth2 access token (bearer) supplied by
//! configuration; token refresh happens outside this crate.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use metrics::counter;
use reqwest::Client;
use serde::Deserialize;

use crate::watch::config::GmailConfig;
use crate::watch::types::{Item, ItemSource};

const API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

#[derive(Debug, Deserialize)]
struct MessagesListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GmailMessage {
    id: String,
    #[serde(rename = "threadId")]
    thread_id: Option<String>,
    #[serde(default)]
    snippet: String,
    /// Milliseconds since epoch, as a string.
    #[serde(rename = "internalDate")]
    internal_date: Option<String>,
    #[serde(default)]
    payload: MessagePart,
}

#[derive(Debug, Default, Deserialize)]
struct MessagePart {
    #[serde(rename = "mimeType", default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: PartBody,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct PartBody {
    data: Option<String>,
}

/// Pulls recent messages from one Gmail mailbox.
#[derive(Clone)]
pub struct GmailSource {
    client: Client,
    api_base: String,
    token: String,
    user_id: String,
    label: String,
    max_results: u32,
}

impl GmailSource {
    pub fn new(cfg: &GmailConfig) -> Result<Self> {
        Ok(Self {
            client: super::http_client()?,
            api_base: API_BASE.to_string(),
            token: cfg.access_token.clone(),
            user_id: cfg.user_id.clone(),
            label: cfg.label.clone(),
            max_results: cfg.max_results,
        })
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let url = format!("{}/users/{}/messages", self.api_base, self.user_id);
        let max = self.max_results.to_string();
        let resp: MessagesListResponse = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .query(&[("labelIds", self.label.as_str()), ("maxResults", max.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context("gmail messages.list")?
            .json()
            .await
            .context("gmail messages.list body")?;
        Ok(resp.messages.into_iter().map(|m| m.id).collect())
    }

    async fn get_message(&self, message_id: &str) -> Result<GmailMessage> {
        let url = format!(
            "{}/users/{}/messages/{}",
            self.api_base, self.user_id, message_id
        );
        self.client
            .get(url)
            .bearer_auth(&self.token)
            .query(&[("format", "full")])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("gmail messages.get {message_id}"))?
            .json()
            .await
            .with_context(|| format!("gmail messages.get {message_id} body"))
    }
}

#[async_trait]
impl ItemSource for GmailSource {
    async fn fetch_candidates(&self) -> Result<Vec<Item>> {
        let ids = self.list_ids().await?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            // Deleted since the list call, or a transient failure: skip it.
            // Still-listed messages are fetched again next cycle.
            match self.get_message(&id).await {
                Ok(msg) => out.push(message_to_item(msg)),
                Err(e) => {
                    tracing::warn!(message_id = %id, error = ?e, "gmail message skipped");
                    counter!("gmail_message_errors_total").increment(1);
                }
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "gmail"
    }
}

fn message_to_item(msg: GmailMessage) -> Item {
    let header = |name: &str| {
        msg.payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.trim().to_string())
    };

    let subject = header("subject")
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "(No Subject)".to_string());
    let from = header("from").unwrap_or_else(|| "Unknown".to_string());
    let to = header("to").unwrap_or_default();
    let date = header("date").unwrap_or_default();

    let body = plain_text_body(&msg.payload).unwrap_or_else(|| msg.snippet.clone());

    let mut item = Item::new(msg.id.as_str(), "gmail", "email")
        .with_title(subject)
        .with_sender(from)
        .with_body(body);
    if let Some(ts) = msg
        .internal_date
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
    {
        item.received_at = ts;
    }
    if !to.is_empty() {
        item.meta.insert("to".into(), to);
    }
    if !date.is_empty() {
        item.meta.insert("date".into(), date);
    }
    if let Some(thread) = msg.thread_id {
        item.meta.insert("thread_id".into(), thread);
    }
    item
}

/// The single-part body, or the first `text/plain` part found depth-first.
fn plain_text_body(part: &MessagePart) -> Option<String> {
    if part.parts.is_empty() {
        return part.body.data.as_deref().and_then(decode_base64url);
    }
    part.parts.iter().find_map(|p| {
        if p.mime_type.eq_ignore_ascii_case("text/plain") {
            p.body.data.as_deref().and_then(decode_base64url)
        } else if !p.parts.is_empty() {
            plain_text_body(p)
        } else {
            None
        }
    })
}

fn decode_base64url(data: &str) -> Option<String> {
    let bytes = URL_SAFE
        .decode(data)
        .or_else(|_| URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')))
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}
