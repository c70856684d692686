// src/watch/config.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PATH: &str = "WATCHERS_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/watchers.toml";
pub const DEFAULT_JSON_PATH: &str = "config/watchers.json";

fn default_vault_path() -> PathBuf {
    PathBuf::from("vault")
}
fn default_true() -> bool {
    true
}
fn default_gmail_user() -> String {
    "me".to_string()
}
fn default_gmail_label() -> String {
    "INBOX".to_string()
}
fn default_gmail_max_results() -> u32 {
    10
}
fn default_linkedin_api_base() -> String {
    "https://api.linkedin.com".to_string()
}
fn default_linkedin_count() -> u32 {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchersConfig {
    #[serde(default = "default_vault_path")]
    pub vault_path: PathBuf,
    /// Seed every watcher with the ids of notes already in the vault.
    #[serde(default = "default_true")]
    pub seed_from_vault: bool,
    #[serde(default, rename = "watcher")]
    pub watchers: Vec<WatcherConfig>,
}

impl Default for WatchersConfig {
    fn default() -> Self {
        Self {
            vault_path: default_vault_path(),
            seed_from_vault: true,
            watchers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatcherConfig {
    pub name: String,
    /// Falls back to the source kind's default when absent.
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub seed_history: Vec<String>,
    #[serde(default)]
    pub skip_backlog: bool,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub source: SourceConfig,
}

impl WatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(
            self.poll_interval_secs
                .unwrap_or_else(|| self.source.default_interval_secs()),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Gmail(GmailConfig),
    Linkedin(LinkedInConfig),
    Feed(FeedConfig),
}

impl SourceConfig {
    /// LinkedIn rate limits are stricter, hence the longer default.
    pub fn default_interval_secs(&self) -> u64 {
        match self {
            SourceConfig::Gmail(_) => 60,
            SourceConfig::Linkedin(_) => 300,
            SourceConfig::Feed(_) => 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GmailConfig {
    /// OAuth2 bearer token, or "env:NAME".
    pub access_token: String,
    #[serde(default = "default_gmail_user")]
    pub user_id: String,
    #[serde(default = "default_gmail_label")]
    pub label: String,
    #[serde(default = "default_gmail_max_results")]
    pub max_results: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkedInConfig {
    /// OAuth2 bearer token, or "env:NAME".
    pub access_token: String,
    #[serde(default = "default_linkedin_api_base")]
    pub api_base: String,
    #[serde(default = "default_linkedin_count")]
    pub count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub url: String,
    /// Shown as the item source in the vault; defaults to "feed".
    #[serde(default)]
    pub label: Option<String>,
}

/// Load watcher configuration from an explicit path. Supports TOML or JSON.
pub fn load_from(path: &Path) -> Result<WatchersConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading watcher config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let mut cfg = parse_config(&content, ext.as_str())
        .with_context(|| format!("parsing watcher config {}", path.display()))?;
    cfg.resolve_secrets()?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load configuration using env var + fallbacks:
/// 1) $WATCHERS_CONFIG_PATH
/// 2) config/watchers.toml
/// 3) config/watchers.json
///
/// No file at all yields an empty configuration.
pub fn load_default() -> Result<WatchersConfig> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_from(&pb);
        } else {
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from(DEFAULT_TOML_PATH);
    if toml_p.exists() {
        return load_from(&toml_p);
    }
    let json_p = PathBuf::from(DEFAULT_JSON_PATH);
    if json_p.exists() {
        return load_from(&json_p);
    }
    Ok(WatchersConfig::default())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<WatchersConfig> {
    let looks_like_json = s.trim_start().starts_with('{');
    if hint_ext == "json" || (hint_ext != "toml" && looks_like_json) {
        return serde_json::from_str(s).context("invalid JSON watcher config");
    }
    toml::from_str(s).context("invalid TOML watcher config")
}

/// "env:NAME" → value of $NAME; anything else is returned trimmed.
fn resolve_secret(raw: &str) -> Result<String> {
    let t = raw.trim();
    match t.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("env:") => {
            let var = t[4..].trim();
            std::env::var(var).map_err(|_| anyhow!("missing {var} env var"))
        }
        _ => Ok(t.to_string()),
    }
}

impl WatchersConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg = parse_config(s, "toml")?;
        cfg.resolve_secrets()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &WatcherConfig> {
        self.watchers.iter().filter(|w| w.enabled)
    }

    fn resolve_secrets(&mut self) -> Result<()> {
        for w in self.watchers.iter_mut().filter(|w| w.enabled) {
            let token = match &mut w.source {
                SourceConfig::Gmail(g) => &mut g.access_token,
                SourceConfig::Linkedin(l) => &mut l.access_token,
                SourceConfig::Feed(_) => continue,
            };
            *token = resolve_secret(token)
                .with_context(|| format!("watcher `{}`: resolving access_token", w.name))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for w in &self.watchers {
            let name = w.name.trim();
            if name.is_empty() {
                bail!("watcher with empty name");
            }
            if !names.insert(name.to_ascii_lowercase()) {
                bail!("duplicate watcher name `{name}`");
            }
            if w.poll_interval_secs == Some(0) {
                bail!("watcher `{name}`: poll_interval_secs must be positive");
            }
            if !w.enabled {
                continue;
            }
            match &w.source {
                SourceConfig::Gmail(g) if g.access_token.is_empty() => {
                    bail!("watcher `{name}`: gmail access_token is empty")
                }
                SourceConfig::Gmail(g) if g.max_results == 0 => {
                    bail!("watcher `{name}`: gmail max_results must be positive")
                }
                SourceConfig::Linkedin(l) if l.access_token.is_empty() => {
                    bail!("watcher `{name}`: linkedin access_token is empty")
                }
                SourceConfig::Feed(f) if f.url.trim().is_empty() => {
                    bail!("watcher `{name}`: feed url is empty")
                }
                _ => {}
            }
        }
        Ok(())
    }
}
