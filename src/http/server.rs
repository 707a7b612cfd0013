//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the redirect middleware and pass-through
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind server to listener and drain on shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::RewriterServiceConfig;
use crate::http::middleware::redirect_middleware;
use crate::http::upstream::{pass_through, Upstream};
use crate::rewrite::Rewriter;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub rewriter: Arc<Rewriter>,
    pub upstream: Option<Upstream>,
}

/// HTTP server fronting the application.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: &RewriterServiceConfig, rewriter: Arc<Rewriter>) -> Self {
        let upstream = config.upstream.address.as_deref().and_then(|address| {
            let upstream = Upstream::new(address);
            if upstream.is_none() {
                tracing::error!(address, "Invalid upstream address, requests will not be forwarded");
            }
            upstream
        });

        let state = AppState { rewriter, upstream };
        let router = Self::build_router(config, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &RewriterServiceConfig, state: AppState) -> Router {
        Router::new()
            .fallback(pass_through)
            .layer(middleware::from_fn_with_state(state.clone(), redirect_middleware))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The assembled router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
