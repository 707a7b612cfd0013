//! Admin API.
//!
//! # Responsibilities
//! - Report rewriter and cache state
//! - Clear the rule caches on demand
//!
//! # Design Decisions
//! - Served on its own listener, never on the public one
//! - Every route requires the configured bearer key

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::rewrite::Rewriter;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub rewriter: Arc<Rewriter>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/cache", get(get_cache))
        .route("/admin/cache/clear", post(clear_cache))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
