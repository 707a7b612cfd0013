//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the rule cache and rewriter from validated configuration
//! - Start background tasks (rules watcher, metrics exporter)
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: bind and exporter errors are fatal
//! - A watcher that cannot start is logged; the admin API can still clear
//!   the cache
//! - Rules are not loaded here; the first eligible request loads them
//! - Listeners start last (traffic only when ready)

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::BuildError;
use notify::RecommendedWatcher;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::admin::{setup_admin_router, AdminState};
use crate::config::watcher::RulesWatcher;
use crate::config::RewriterServiceConfig;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::rewrite::Rewriter;
use crate::rules::{FileRuleSource, RuleCache, RuleSource};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind {name} listener on {address}: {source}")]
    Bind {
        name: &'static str,
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),

    #[error("failed to install metrics exporter: {0}")]
    Metrics(#[from] BuildError),
}

/// Running servers and the handles needed to stop them.
pub struct Services {
    pub rewriter: Arc<Rewriter>,
    pub http_addr: SocketAddr,
    pub admin_addr: Option<SocketAddr>,
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<Result<(), io::Error>>>,
    _watcher: Option<RecommendedWatcher>,
}

impl Services {
    /// Ask every server to stop accepting and drain.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Wait for all servers to stop.
    pub async fn wait(self) -> Result<(), io::Error> {
        for task in self.tasks {
            match task.await {
                Ok(result) => result?,
                Err(e) => tracing::error!(error = %e, "Server task failed"),
            }
        }
        Ok(())
    }
}

/// Start the rewriter with rules read from the configured files.
pub async fn start(config: RewriterServiceConfig) -> Result<Services, StartupError> {
    let source = Arc::new(FileRuleSource::from_config(&config.rewriter));
    start_with_source(config, source).await
}

/// Start the rewriter with an explicit rule source.
pub async fn start_with_source(
    config: RewriterServiceConfig,
    source: Arc<dyn RuleSource>,
) -> Result<Services, StartupError> {
    let cache = Arc::new(RuleCache::new(source));
    let rewriter = Arc::new(Rewriter::new(
        config.rewriter.clone(),
        config.sites.clone(),
        cache.clone(),
    ));

    if config.observability.metrics_enabled {
        let address = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(address)?;
    }

    let watcher = start_watcher(&config, cache);

    let shutdown = Shutdown::new();
    let (listener, http_addr) = bind("http", &config.listener.bind_address).await?;
    let server = HttpServer::new(&config, rewriter.clone());
    let mut tasks = vec![tokio::spawn(server.run(listener, shutdown.subscribe()))];

    let admin_addr = if config.admin.enabled {
        let (listener, addr) = bind("admin", &config.admin.bind_address).await?;
        let router = setup_admin_router(AdminState {
            rewriter: rewriter.clone(),
            api_key: Arc::from(config.admin.api_key.as_str()),
        });
        let mut rx = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            tracing::info!(address = %addr, "Admin server starting");
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = rx.recv().await;
                })
                .await
        }));
        Some(addr)
    } else {
        None
    };

    tracing::info!(
        http = %http_addr,
        admin = ?admin_addr,
        enabled = config.rewriter.enabled,
        sites = config.sites.len(),
        "Rewriter started"
    );

    Ok(Services {
        rewriter,
        http_addr,
        admin_addr,
        shutdown,
        tasks,
        _watcher: watcher,
    })
}

fn start_watcher(config: &RewriterServiceConfig, cache: Arc<RuleCache>) -> Option<RecommendedWatcher> {
    let rewriter = &config.rewriter;
    if !rewriter.watch_rules {
        return None;
    }
    if rewriter.rules_location.is_none() && rewriter.exceptions_location.is_none() {
        return None;
    }

    let watcher = RulesWatcher::new(
        rewriter.rules_location.as_deref(),
        rewriter.exceptions_location.as_deref(),
        cache,
    );
    match watcher.run() {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::error!(error = %e, "Failed to start rules watcher, changes need an explicit cache clear");
            None
        }
    }
}

async fn bind(name: &'static str, address: &str) -> Result<(TcpListener, SocketAddr), StartupError> {
    let to_error = |source| StartupError::Bind {
        name,
        address: address.to_string(),
        source,
    };
    let listener = TcpListener::bind(address).await.map_err(to_error)?;
    let local_addr = listener.local_addr().map_err(to_error)?;
    Ok((listener, local_addr))
}
