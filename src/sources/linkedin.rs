//! LinkedIn notifications source.
//!
//! Pulls the newest notification elements from a LinkedIn REST endpoint and
//! maps each one to an [`Item`]. Elements without any identifier are dropped:
//! they cannot be deduplicated.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::sources::plain_text;
use crate::watch::config::LinkedInConfig;
use crate::watch::types::{Item, ItemSource};

#[derive(Debug, Deserialize)]
struct Elements {
    #[serde(default)]
    elements: Vec<Notification>,
}

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(rename = "entityUrn")]
    entity_urn: Option<String>,
    id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    /// Milliseconds since epoch.
    #[serde(rename = "createdAt")]
    created_at: Option<i64>,
    title: Option<TextField>,
    message: Option<TextField>,
    actor: Option<Actor>,
}

#[derive(Debug, Deserialize)]
struct TextField {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Actor {
    name: Option<ActorName>,
    #[serde(rename = "publicIdentifier")]
    public_identifier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActorName {
    #[serde(rename = "firstName", default)]
    first_name: String,
    #[serde(rename = "lastName", default)]
    last_name: String,
}

/// Pulls notification events from LinkedIn.
#[derive(Clone)]
pub struct LinkedInSource {
    client: Client,
    api_base: String,
    token: String,
    count: u32,
}

impl LinkedInSource {
    pub fn new(cfg: &LinkedInConfig) -> Result<Self> {
        Ok(Self {
            client: super::http_client()?,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            token: cfg.access_token.clone(),
            count: cfg.count,
        })
    }
}

#[async_trait]
impl ItemSource for LinkedInSource {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn fetch_candidates(&self) -> Result<Vec<Item>> {
        let body: Elements = self
            .client
            .get(format!("{}/v2/notifications", self.api_base))
            .bearer_auth(&self.token)
            .query(&[("count", self.count)])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context("linkedin notifications")?
            .json()
            .await
            .context("linkedin notifications body")?;
        Ok(elements_to_items(body))
    }

    fn name(&self) -> &'static str {
        "linkedin"
    }
}

fn elements_to_items(body: Elements) -> Vec<Item> {
    body.elements
        .into_iter()
        .filter_map(|n| {
            let Some(id) = n.entity_urn.clone().or_else(|| n.id.clone()) else {
                tracing::debug!(kind = ?n.kind, "linkedin element without id skipped");
                return None;
            };
            Some(notification_to_item(id, n))
        })
        .collect()
}

fn notification_to_item(id: String, n: Notification) -> Item {
    let text = |f: Option<TextField>| {
        f.and_then(|t| t.text)
            .map(|t| plain_text(&t))
            .unwrap_or_default()
    };
    let title = text(n.title);
    let body = text(n.message);

    let mut item = Item::new(id, "linkedin", "notification")
        .with_title(if title.is_empty() { "Notification".to_string() } else { title })
        .with_body(body);

    if let Some(ts) = n.created_at.and_then(DateTime::<Utc>::from_timestamp_millis) {
        item.received_at = ts;
    }
    if let Some(actor) = n.actor {
        if let Some(name) = actor.name {
            let full = format!("{} {}", name.first_name.trim(), name.last_name.trim());
            let full = full.trim();
            if !full.is_empty() {
                item.sender = Some(full.to_string());
            }
        }
        if let Some(profile) = actor.public_identifier.filter(|p| !p.is_empty()) {
            item.meta.insert("sender_profile".into(), profile);
        }
    }
    if let Some(kind) = n.kind {
        item.meta.insert("notification_type".into(), kind);
    }
    item
}
