use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::rules::CacheStatus;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub enabled: bool,
    pub remove_trailing_slash: bool,
    pub cache: CacheStatus,
}

#[derive(Serialize)]
pub struct ClearResult {
    pub cleared: bool,
    pub cache: CacheStatus,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let config = state.rewriter.config();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        enabled: config.enabled,
        remove_trailing_slash: config.remove_trailing_slash,
        cache: state.rewriter.cache().status(),
    })
}

pub async fn get_cache(State(state): State<AdminState>) -> Json<CacheStatus> {
    Json(state.rewriter.cache().status())
}

/// Drop cached rules and exceptions; the next request reloads both.
pub async fn clear_cache(State(state): State<AdminState>) -> Json<ClearResult> {
    let cache = state.rewriter.cache();
    cache.clear_all();
    tracing::info!("Rule caches cleared via admin API");
    Json(ClearResult {
        cleared: true,
        cache: cache.status(),
    })
}
