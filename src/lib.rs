// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod bootstrap;
pub mod manager;
pub mod metrics;
pub mod sources;
pub mod vault;
pub mod watch;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::manager::WatcherManager;
pub use crate::vault::{Vault, VaultSink};
pub use crate::watch::seen::SeenSet;
pub use crate::watch::types::{Item, ItemFilter, ItemSink, ItemSource};
pub use crate::watch::{CycleReport, Watcher, WatcherBuilder, WatcherState, WatcherStatus};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
/// - filter from RUST_LOG, default `vault_watch=info,warn`
/// - WATCH_LOG_JSON=1 switches to JSON lines
///
/// A subscriber installed earlier (e.g. by the shuttle runtime) is left in place.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vault_watch=info,watch=info,warn"));

    let json = std::env::var("WATCH_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
