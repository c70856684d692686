use std::collections::BTreeMap;
use std::sync::Arc;

use shuttle_axum::axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::manager::WatcherManager;
use crate::vault::{Vault, VaultStatus};
use crate::watch::{CycleReport, Watcher, WatcherState, WatcherStatus};

#[derive(Clone)]
pub struct AppState {
    manager: Arc<WatcherManager>,
    vault: Option<Vault>,
}

impl AppState {
    pub fn new(manager: Arc<WatcherManager>, vault: Option<Vault>) -> Self {
        Self { manager, vault }
    }
}

type ApiError = (StatusCode, String);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/watchers", get(list_watchers))
        .route("/watchers/health", get(watchers_health))
        .route("/watchers/{name}", get(watcher_status))
        .route("/watchers/{name}/start", post(start_watcher))
        .route("/watchers/{name}/stop", post(stop_watcher))
        .route("/watchers/{name}/poll", post(poll_watcher))
        .route("/vault/status", get(vault_status))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn lookup(state: &AppState, name: &str) -> Result<Arc<Watcher>, ApiError> {
    state
        .manager
        .get(name)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown watcher `{name}`")))
}

fn internal(e: anyhow::Error) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
}

#[derive(serde::Serialize)]
struct LifecycleResp {
    name: String,
    /// false when the call was a no-op (already in the requested state)
    changed: bool,
    state: WatcherState,
}

async fn list_watchers(State(state): State<AppState>) -> Json<Vec<WatcherStatus>> {
    Json(state.manager.statuses())
}

async fn watchers_health(State(state): State<AppState>) -> Json<BTreeMap<String, bool>> {
    Json(state.manager.health_check())
}

async fn watcher_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<WatcherStatus>, ApiError> {
    Ok(Json(lookup(&state, &name)?.status()))
}

async fn start_watcher(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<LifecycleResp>, ApiError> {
    let w = lookup(&state, &name)?;
    let changed = w.start().map_err(internal)?;
    Ok(Json(LifecycleResp {
        name,
        changed,
        state: w.state(),
    }))
}

async fn stop_watcher(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<LifecycleResp>, ApiError> {
    let w = lookup(&state, &name)?;
    let changed = w.stop().map_err(internal)?;
    Ok(Json(LifecycleResp {
        name,
        changed,
        state: w.state(),
    }))
}

async fn poll_watcher(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CycleReport>, ApiError> {
    let w = lookup(&state, &name)?;
    Ok(Json(w.poll_once().await))
}

async fn vault_status(State(state): State<AppState>) -> Result<Json<VaultStatus>, ApiError> {
    let Some(vault) = state.vault.as_ref() else {
        return Err((StatusCode::NOT_FOUND, "no vault configured".to_string()));
    };
    Ok(Json(vault.status().await.map_err(internal)?))
}
