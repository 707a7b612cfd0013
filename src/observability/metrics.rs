//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define rewriter metrics (redirects, cache loads, stage failures)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `rewriter_redirects_total` (counter): redirects issued, by stage
//! - `rewriter_cache_loads_total` (counter): cache loads, by kind and outcome
//! - `rewriter_cache_clears_total` (counter): cache clears, by kind
//! - `rewriter_cached_rules` (gauge): rules in the current snapshot, by kind
//! - `rewriter_stage_errors_total` (counter): failed matching stages, by stage
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library users
//!   and tests pay nothing
//! - Label values are static strings to keep cardinality bounded

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(address: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(address).install()?;
    tracing::info!(%address, "Metrics endpoint listening");
    Ok(())
}

pub fn record_redirect(stage: &'static str) {
    counter!("rewriter_redirects_total", "stage" => stage).increment(1);
}

pub fn record_stage_error(stage: &'static str) {
    counter!("rewriter_stage_errors_total", "stage" => stage).increment(1);
}

pub fn record_cache_load(kind: &'static str, outcome: &'static str) {
    counter!("rewriter_cache_loads_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_cache_clear(kind: &'static str) {
    counter!("rewriter_cache_clears_total", "kind" => kind).increment(1);
}

/// Publish the rule counts of the current snapshot.
pub fn record_rule_counts(url_rules: usize, host_rules: usize) {
    gauge!("rewriter_cached_rules", "kind" => "url").set(url_rules as f64);
    gauge!("rewriter_cached_rules", "kind" => "hostname").set(host_rules as f64);
}
