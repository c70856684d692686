//! vault-watch service entrypoint
//! Loads watcher configuration, starts every enabled watcher and serves the
//! operator API (`/watchers/...`, `/metrics`).

use shuttle_axum::ShuttleAxum;
use vault_watch::bootstrap;
use vault_watch::watch::config;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    // Secrets referenced as "env:NAME" in the config can live there.
    let _ = dotenvy::dotenv();

    vault_watch::init_tracing();

    let cfg = config::load_default()?;
    let router = bootstrap::service(&cfg).await?;

    Ok(router.into())
}
