// src/bootstrap.rs
use anyhow::{Context, Result};
use std::sync::Arc;
use shuttle_axum::axum::Router;
use tracing::{info, warn};

use crate::api::{self, AppState};
use crate::manager::WatcherManager;
use crate::metrics::Metrics;
use crate::sources::{feed::FeedSource, gmail::GmailSource, linkedin::LinkedInSource};
use crate::vault::{Vault, VaultSink};
use crate::watch::config::{SourceConfig, WatcherConfig, WatchersConfig};
use crate::watch::filter::KeywordFilter;
use crate::watch::types::ItemSource;
use crate::watch::Watcher;

/// Everything the service needs at runtime, built from configuration.
pub struct Runtime {
    pub vault: Vault,
    pub manager: Arc<WatcherManager>,
}

pub fn build_source(cfg: &WatcherConfig) -> Result<Box<dyn ItemSource>> {
    let source: Box<dyn ItemSource> = match &cfg.source {
        SourceConfig::Gmail(g) => Box::new(GmailSource::new(g)?),
        SourceConfig::Linkedin(l) => Box::new(LinkedInSource::new(l)?),
        SourceConfig::Feed(f) => Box::new(FeedSource::from_url(
            f.label.clone().unwrap_or_else(|| "feed".to_string()),
            f.url.clone(),
        )?),
    };
    Ok(source)
}

/// Create the vault folders and one watcher per enabled entry. All watchers
/// write into the same vault; each keeps its own seen set.
pub async fn runtime_from_config(cfg: &WatchersConfig) -> Result<Runtime> {
    let vault = Vault::new(&cfg.vault_path);
    vault
        .ensure_structure()
        .await
        .context("preparing vault folders")?;

    let history = if cfg.seed_from_vault {
        vault.recorded_ids().await.context("reading vault history")?
    } else {
        Vec::new()
    };
    info!(
        vault = %vault.root().display(),
        recorded = history.len(),
        "vault ready"
    );

    let mut manager = WatcherManager::new();
    for wc in cfg.enabled() {
        let watcher = Watcher::builder(wc.name.as_str())
            .boxed_source(build_source(wc)?)
            .sink(VaultSink::new(vault.clone()))
            .filter(KeywordFilter::new(&wc.keywords))
            .poll_interval(wc.poll_interval())
            .seed_history(history.iter().cloned())
            .seed_history(wc.seed_history.iter().cloned())
            .skip_backlog(wc.skip_backlog)
            .build()
            .with_context(|| format!("building watcher `{}`", wc.name))?;
        manager.register(watcher)?;
    }

    Ok(Runtime {
        vault,
        manager: Arc::new(manager),
    })
}

/// Full service router: installs the Prometheus recorder first so the
/// watchers' gauges and metric descriptions land in it, then builds and
/// starts every watcher.
pub async fn service(cfg: &WatchersConfig) -> Result<Router> {
    let metrics = Metrics::init()?;

    if cfg.watchers.is_empty() {
        warn!("no watchers configured; serving API only");
    }
    let rt = runtime_from_config(cfg).await?;
    for (name, ok) in rt.manager.start_all() {
        if !ok {
            warn!(watcher = %name, "watcher not started");
        }
    }

    Ok(api::router(AppState::new(rt.manager, Some(rt.vault))).merge(metrics.router()))
}
