//! Request eligibility.
//!
//! # Responsibilities
//! - Resolve the site serving a request host
//! - Decide whether the rewriter should look at a request at all
//!
//! # Design Decisions
//! - Host matching is case-insensitive
//! - First site listing the host wins; a site without hosts is the fallback
//! - Only GET requests are ever redirected

use axum::http::Method;

use crate::config::{RewriterConfig, SiteConfig};

/// Why a request was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotGet,
    CoreDatabase,
    IgnoredSite,
}

/// Maps request hosts to configured sites.
#[derive(Debug, Clone, Default)]
pub struct SiteResolver {
    sites: Vec<SiteConfig>,
}

impl SiteResolver {
    pub fn new(sites: Vec<SiteConfig>) -> Self {
        Self { sites }
    }

    /// The site serving `host`, if any.
    pub fn resolve(&self, host: &str) -> Option<&SiteConfig> {
        self.sites
            .iter()
            .find(|site| site.hosts.iter().any(|h| h.eq_ignore_ascii_case(host)))
            .or_else(|| self.sites.iter().find(|site| site.hosts.is_empty()))
    }
}

/// Returns the reason to skip the request, or `None` if it is eligible.
pub fn ignore_reason(
    method: &Method,
    site: Option<&SiteConfig>,
    config: &RewriterConfig,
) -> Option<IgnoreReason> {
    if method != Method::GET {
        return Some(IgnoreReason::NotGet);
    }

    let site = site?;
    if site.database.eq_ignore_ascii_case(&config.core_database) {
        return Some(IgnoreReason::CoreDatabase);
    }

    let name = site.name.to_lowercase();
    if config.ignore_for_sites.iter().any(|ignored| ignored.to_lowercase() == name) {
        return Some(IgnoreReason::IgnoredSite);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(name: &str, hosts: &[&str], database: &str) -> SiteConfig {
        SiteConfig {
            name: name.into(),
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
            database: database.into(),
        }
    }

    fn resolver() -> SiteResolver {
        SiteResolver::new(vec![
            site("admin", &["cms.example.com"], "core"),
            site("website", &["www.example.com"], "web"),
            site("shell", &["shell.example.com"], "web"),
            site("fallback", &[], "web"),
        ])
    }

    #[test]
    fn test_resolve() {
        let resolver = resolver();
        assert_eq!(resolver.resolve("WWW.example.com").unwrap().name, "website");
        assert_eq!(resolver.resolve("cms.example.com").unwrap().name, "admin");
        assert_eq!(resolver.resolve("unknown.example.com").unwrap().name, "fallback");
        assert!(SiteResolver::default().resolve("www.example.com").is_none());
    }

    #[test]
    fn test_ignore_reason() {
        let resolver = resolver();
        let config = RewriterConfig {
            ignore_for_sites: vec!["Shell".into()],
            ..Default::default()
        };

        assert_eq!(
            ignore_reason(&Method::POST, resolver.resolve("www.example.com"), &config),
            Some(IgnoreReason::NotGet)
        );
        assert_eq!(
            ignore_reason(&Method::GET, resolver.resolve("cms.example.com"), &config),
            Some(IgnoreReason::CoreDatabase)
        );
        assert_eq!(
            ignore_reason(&Method::GET, resolver.resolve("shell.example.com"), &config),
            Some(IgnoreReason::IgnoredSite)
        );
        assert_eq!(ignore_reason(&Method::GET, resolver.resolve("www.example.com"), &config), None);
        assert_eq!(ignore_reason(&Method::GET, None, &config), None);
    }
}
