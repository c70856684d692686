//! Run one poll cycle of every configured watcher and print the reports as JSON.
//! Handy from cron or for checking credentials before starting the service.

use std::collections::BTreeMap;

use vault_watch::bootstrap::runtime_from_config;
use vault_watch::watch::config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    vault_watch::init_tracing();

    let cfg = config::load_default()?;
    let rt = runtime_from_config(&cfg).await?;

    let mut reports = BTreeMap::new();
    for name in rt.manager.names() {
        let report = rt.manager.poll(&name).await?;
        reports.insert(name, report);
    }

    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}
