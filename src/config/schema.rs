//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the rewriter.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Placeholder admin key; validation refuses it when the admin API is on.
pub const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

/// Root configuration for the URL rewriter.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RewriterServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Rule engine settings.
    pub rewriter: RewriterConfig,

    /// Known sites, used to decide which requests are eligible.
    pub sites: Vec<SiteConfig>,

    /// Where non-redirected requests go.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Rule engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriterConfig {
    /// Master switch; when false every request passes through untouched.
    pub enabled: bool,

    /// Redirect `/foo/` to `/foo`.
    pub remove_trailing_slash: bool,

    /// Log every issued redirect at info level.
    pub log_rewrites: bool,

    /// Site names (lower-case) the rewriter never touches.
    pub ignore_for_sites: Vec<String>,

    /// Requests for sites backed by this database are ignored.
    pub core_database: String,

    /// Rules file (TOML, or JSON with a `.json` extension).
    pub rules_location: Option<PathBuf>,

    /// Type exceptions file (TOML or JSON). Absent means no exceptions.
    pub exceptions_location: Option<PathBuf>,

    /// Query prefix marking a request forwarded by the not-found page.
    pub forced_error_marker: String,

    /// Scheme assumed when no `X-Forwarded-Proto` header is present.
    pub default_scheme: String,

    /// Clear the cache when the rules or exceptions files change.
    pub watch_rules: bool,
}

impl Default for RewriterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            remove_trailing_slash: false,
            log_rewrites: false,
            ignore_for_sites: vec!["shell".to_string(), "login".to_string(), "admin".to_string()],
            core_database: "core".to_string(),
            rules_location: None,
            exceptions_location: None,
            forced_error_marker: "404;".to_string(),
            default_scheme: "http".to_string(),
            watch_rules: true,
        }
    }
}

/// A site served behind the rewriter.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    /// Site identifier, matched against `ignore_for_sites`.
    pub name: String,

    /// Hostnames belonging to this site. Empty makes it the fallback site.
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Content database the site reads from.
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_database() -> String {
    "web".to_string()
}

/// Pass-through backend for requests that are not redirected.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Backend address (e.g., "127.0.0.1:3000"). Unset answers 404.
    pub address: Option<String>,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_API_KEY.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
