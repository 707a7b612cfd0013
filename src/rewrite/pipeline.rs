//! Per-request rewrite evaluation.
//!
//! # Data Flow
//! ```text
//! RewriteRequest
//!     → exceptions loaded (failures logged, recovery skipped)
//!     → eligibility (method, site database, ignored sites)
//!     → rules loaded (failures logged, rule stages skipped)
//!     → recovery.rs (forced "not found" URL unwrapped)
//!     → trailing slash → URL rules → hostname rules
//!     → first redirect wins → Decision
//! ```
//!
//! # Design Decisions
//! - Evaluation never fails: every fault degrades to `NoAction`
//! - A failing stage does not stop later stages
//! - An inconsistent cached rule clears the rule cache so the next
//!   request reloads it

use std::sync::Arc;

use axum::http::Method;
use url::Url;

use crate::config::{RewriterConfig, SiteConfig};
use crate::observability::metrics;
use crate::rewrite::decision::Decision;
use crate::rewrite::engine::{self, MatchError};
use crate::rewrite::recovery;
use crate::rewrite::site::{ignore_reason, SiteResolver};
use crate::rules::{CacheError, RuleCache, RuleSet};

/// The parts of an HTTP request the rewriter looks at.
#[derive(Debug, Clone)]
pub struct RewriteRequest {
    pub method: Method,
    /// Absolute request URL, including scheme and host.
    pub url: Url,
}

impl RewriteRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }
}

/// Rule category that produced (or failed to produce) a redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    TrailingSlash,
    UrlRule,
    HostName,
}

impl Stage {
    const ORDER: [Stage; 3] = [Stage::TrailingSlash, Stage::UrlRule, Stage::HostName];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::TrailingSlash => "trailing_slash",
            Stage::UrlRule => "url_rule",
            Stage::HostName => "hostname",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Loading {
    Allowed,
    CachedOnly,
}

struct Redirect {
    target: Url,
    rule_id: Option<String>,
}

/// Evaluates requests against the cached rules.
pub struct Rewriter {
    config: RewriterConfig,
    sites: SiteResolver,
    cache: Arc<RuleCache>,
}

impl Rewriter {
    pub fn new(config: RewriterConfig, sites: Vec<SiteConfig>, cache: Arc<RuleCache>) -> Self {
        Self {
            config,
            sites: SiteResolver::new(sites),
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<RuleCache> {
        &self.cache
    }

    pub fn config(&self) -> &RewriterConfig {
        &self.config
    }

    /// True when evaluating may block on a rule source fetch.
    pub fn needs_load(&self) -> bool {
        self.config.enabled && !(self.cache.is_loaded() && self.cache.exceptions_loaded())
    }

    /// Decide what to do with `request`, loading rules if needed.
    pub fn evaluate(&self, request: &RewriteRequest) -> Decision {
        self.decide(request, Loading::Allowed).unwrap_or_default()
    }

    /// Decide from cached snapshots only.
    ///
    /// Returns `None` when a snapshot is missing; the caller then has to use
    /// [`Rewriter::evaluate`], which may block on the rule source.
    pub fn evaluate_cached(&self, request: &RewriteRequest) -> Option<Decision> {
        self.decide(request, Loading::CachedOnly)
    }

    fn decide(&self, request: &RewriteRequest, loading: Loading) -> Option<Decision> {
        if !self.config.enabled {
            return Some(Decision::NoAction);
        }

        let exceptions = match loading {
            Loading::CachedOnly => Some(self.cache.exceptions()?),
            Loading::Allowed => match self.cache.ensure_exceptions_loaded() {
                Ok(exceptions) => Some(exceptions),
                Err(e) => {
                    self.log_load_error("exceptions", &e);
                    None
                }
            },
        };

        let host = request.url.host_str().unwrap_or_default();
        let site = self.sites.resolve(host);
        if let Some(reason) = ignore_reason(&request.method, site, &self.config) {
            tracing::trace!(
                url = %request.url,
                site = site.map(|s| s.name.as_str()),
                reason = ?reason,
                "Request not eligible for rewriting"
            );
            return Some(Decision::NoAction);
        }

        let rules = match loading {
            Loading::CachedOnly => Some(self.cache.snapshot()?),
            Loading::Allowed => match self.cache.ensure_loaded() {
                Ok(rules) => Some(rules),
                Err(e) => {
                    self.log_load_error("rules", &e);
                    None
                }
            },
        };

        let url = match &exceptions {
            Some(exceptions) => recovery::recover(
                &request.url,
                exceptions.as_slice(),
                &self.config.forced_error_marker,
            ),
            None => request.url.clone(),
        };

        for stage in Stage::ORDER {
            match self.run_stage(stage, &url, rules.as_deref()) {
                Ok(Some(redirect)) => {
                    let decision = Decision::redirect_to(redirect.target.as_str());
                    if decision.is_redirect() {
                        self.log_redirect(stage, &request.url, &redirect);
                        metrics::record_redirect(stage.as_str());
                        return Some(decision);
                    }
                }
                Ok(None) => {}
                Err(e) => self.handle_stage_error(stage, &url, e),
            }
        }

        Some(Decision::NoAction)
    }

    fn run_stage(
        &self,
        stage: Stage,
        url: &Url,
        rules: Option<&RuleSet>,
    ) -> Result<Option<Redirect>, MatchError> {
        match stage {
            Stage::TrailingSlash => {
                if !self.config.remove_trailing_slash {
                    return Ok(None);
                }
                Ok(engine::trailing_slash_target(url)?.map(|target| Redirect {
                    target,
                    rule_id: None,
                }))
            }
            Stage::UrlRule => {
                let Some(rules) = rules else { return Ok(None) };
                match engine::match_url_rule(url, rules.url_rules())? {
                    Some(matched) => Ok(Some(Redirect {
                        target: engine::url_rule_target(url, &matched)?,
                        rule_id: Some(matched.rule.id.clone()),
                    })),
                    None => Ok(None),
                }
            }
            Stage::HostName => {
                let Some(rules) = rules else { return Ok(None) };
                match engine::match_host_rule(url, rules.host_rules())? {
                    Some(rule) => Ok(Some(Redirect {
                        target: engine::host_rule_target(url, rule)?,
                        rule_id: Some(rule.id.clone()),
                    })),
                    None => Ok(None),
                }
            }
        }
    }

    fn log_redirect(&self, stage: Stage, from: &Url, redirect: &Redirect) {
        let rule_id = redirect.rule_id.as_deref().unwrap_or("-");
        if self.config.log_rewrites {
            tracing::info!(%stage, rule_id, from = %from, to = %redirect.target, "Redirecting request");
        } else {
            tracing::debug!(%stage, rule_id, from = %from, to = %redirect.target, "Redirecting request");
        }
    }

    fn log_load_error(&self, kind: &str, err: &CacheError) {
        match err {
            CacheError::EmptyRuleSet => {
                tracing::warn!(kind, "Rule source returned no rules, will retry on next request");
            }
            CacheError::Source(e) => {
                tracing::error!(kind, error = %e, "Failed to load from rule source");
            }
        }
    }

    fn handle_stage_error(&self, stage: Stage, url: &Url, err: MatchError) {
        metrics::record_stage_error(stage.as_str());
        if err.is_cache_inconsistent() {
            tracing::error!(%stage, url = %url, error = %err, "Cached rules are inconsistent, clearing cache");
            self.cache.clear();
        } else {
            tracing::warn!(%stage, url = %url, error = %err, "Rewrite stage failed");
        }
    }
}

impl std::fmt::Debug for Rewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rewriter")
            .field("config", &self.config)
            .field("sites", &self.sites)
            .field("cache", &self.cache)
            .finish()
    }
}
