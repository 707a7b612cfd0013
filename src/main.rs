//! URL Rewriter
//!
//! A permanent-redirect front for web applications, built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────────▶ http server ──▶ redirect middleware ──▶ upstream (or 404)
//!                                              │
//!                                              ▼
//!                                          rewriter
//!                              recovery → trailing slash → URL rules → hostname rules
//!                                              │
//!                                              ▼
//!                                         rule cache ◀── rule files (watched)
//!                                              ▲
//!                                          admin API
//! ```

use std::path::PathBuf;

use clap::Parser;

use url_rewriter::config::{load_config, RewriterServiceConfig};
use url_rewriter::lifecycle::{self, signals};
use url_rewriter::observability::logging;

#[derive(Parser)]
#[command(name = "url-rewriter")]
#[command(about = "URL rewrite and redirect front for web applications", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RewriterServiceConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);

    tracing::info!("url-rewriter v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        config = ?cli.config,
        bind_address = %config.listener.bind_address,
        rules_location = ?config.rewriter.rules_location,
        exceptions_location = ?config.rewriter.exceptions_location,
        upstream = ?config.upstream.address,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let services = lifecycle::start(config).await?;

    signals::shutdown_signal().await;
    services.shutdown();
    services.wait().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
