//! Rule matching.
//!
//! # Responsibilities
//! - Trailing-slash normalisation
//! - Path/query rule selection (with-query mask, then without-query mask)
//! - Hostname rule selection
//! - Redirect target composition for each of the above
//!
//! # Design Decisions
//! - Pure functions over a request URL and rule slices
//! - First match in load order wins
//! - Targets are composed from URL components, never by string splicing;
//!   ports are not carried over
//! - A cached rule that fails to compose is reported as
//!   `CacheInconsistent`, since load-time validation already proved it composes

use thiserror::Error;
use url::Url;

use crate::rewrite::url::{base_url, equal_components, with_path_and_query, Components, UrlBuildError};
use crate::rules::model::{HostNameRewriteRule, UrlRewriteRule};

/// Failures inside a single matching stage.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("malformed request URL: {0}")]
    MalformedRequest(String),

    #[error("cached rule '{rule_id}' is inconsistent: {reason}")]
    CacheInconsistent { rule_id: String, reason: String },
}

impl MatchError {
    /// True when the fault points at stale or corrupt cached rules.
    pub fn is_cache_inconsistent(&self) -> bool {
        matches!(self, MatchError::CacheInconsistent { .. })
    }

    fn inconsistent(rule_id: &str, err: UrlBuildError) -> Self {
        MatchError::CacheInconsistent {
            rule_id: rule_id.to_string(),
            reason: err.to_string(),
        }
    }
}

fn request_host(request: &Url) -> Result<&str, MatchError> {
    request
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| MatchError::MalformedRequest(format!("'{request}' has no host")))
}

/// Redirect target dropping exactly one trailing `/` from the path.
///
/// Returns `None` for the root path and for paths without a trailing slash.
pub fn trailing_slash_target(request: &Url) -> Result<Option<Url>, MatchError> {
    let path = request.path();
    let Some(trimmed) = path.strip_suffix('/').filter(|_| path != "/") else {
        return Ok(None);
    };

    let host = request_host(request)?;
    let base = base_url(request.scheme(), host)
        .map_err(|e| MatchError::MalformedRequest(e.to_string()))?;
    Ok(Some(with_path_and_query(base, trimmed, request.query())))
}

/// A selected URL rewrite rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlRuleMatch<'a> {
    pub rule: &'a UrlRewriteRule,
    /// True when the rule matched without the query, which is then carried over.
    pub preserve_query: bool,
}

fn find_url_rule<'a>(
    request: &Url,
    rules: &'a [UrlRewriteRule],
    mask: Components,
) -> Result<Option<&'a UrlRewriteRule>, MatchError> {
    for rule in rules {
        let source = rule
            .source_url(request)
            .map_err(|e| MatchError::inconsistent(&rule.id, e))?;
        if equal_components(&source, request, mask) {
            return Ok(Some(rule));
        }
    }
    Ok(None)
}

/// Select the first rule matching the full request, else the first matching
/// without the query.
pub fn match_url_rule<'a>(
    request: &Url,
    rules: &'a [UrlRewriteRule],
) -> Result<Option<UrlRuleMatch<'a>>, MatchError> {
    if rules.is_empty() {
        return Ok(None);
    }
    request_host(request)?;

    if let Some(rule) = find_url_rule(request, rules, Components::WITH_QUERY)? {
        return Ok(Some(UrlRuleMatch {
            rule,
            preserve_query: false,
        }));
    }

    Ok(find_url_rule(request, rules, Components::WITHOUT_QUERY)?.map(|rule| UrlRuleMatch {
        rule,
        preserve_query: true,
    }))
}

/// Compose the redirect target for a matched URL rule.
pub fn url_rule_target(request: &Url, matched: &UrlRuleMatch<'_>) -> Result<Url, MatchError> {
    let mut target = matched
        .rule
        .target_url(request)
        .map_err(|e| MatchError::inconsistent(&matched.rule.id, e))?;

    if matched.preserve_query {
        target.set_query(request.query().filter(|q| !q.is_empty()));
    }
    Ok(target)
}

/// Select the first hostname rule for the request host.
pub fn match_host_rule<'a>(
    request: &Url,
    rules: &'a [HostNameRewriteRule],
) -> Result<Option<&'a HostNameRewriteRule>, MatchError> {
    if rules.is_empty() {
        return Ok(None);
    }
    let host = request_host(request)?;
    Ok(rules.iter().find(|rule| rule.matches_host(host)))
}

/// Swap the host, keeping scheme, path and query.
pub fn host_rule_target(request: &Url, rule: &HostNameRewriteRule) -> Result<Url, MatchError> {
    let base = base_url(request.scheme(), &rule.target_host_name)
        .map_err(|e| MatchError::inconsistent(&rule.id, e))?;
    Ok(with_path_and_query(base, request.path(), request.query()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::model::RawRuleRecord;

    fn parse(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn url_rule(id: &str, source: &str, target: &str) -> UrlRewriteRule {
        UrlRewriteRule::from_record(&RawRuleRecord {
            id: id.into(),
            kind: "url".into(),
            source: Some(source.into()),
            target: Some(target.into()),
            ..Default::default()
        })
        .unwrap()
    }

    fn host_rule(id: &str, from: &str, to: &str) -> HostNameRewriteRule {
        HostNameRewriteRule {
            id: id.into(),
            source_host_name: from.into(),
            target_host_name: to.into(),
        }
    }

    fn rewrite(request: &str, rules: &[UrlRewriteRule]) -> Option<String> {
        let request = parse(request);
        let matched = match_url_rule(&request, rules).unwrap()?;
        Some(url_rule_target(&request, &matched).unwrap().to_string())
    }

    #[test]
    fn test_trailing_slash() {
        let target = trailing_slash_target(&parse("http://example.com/foo/?x=1")).unwrap();
        assert_eq!(target.unwrap().as_str(), "http://example.com/foo?x=1");

        let target = trailing_slash_target(&parse("https://example.com:8443/a/b//")).unwrap();
        assert_eq!(target.unwrap().as_str(), "https://example.com/a/b/");

        assert!(trailing_slash_target(&parse("http://example.com/")).unwrap().is_none());
        assert!(trailing_slash_target(&parse("http://example.com/foo")).unwrap().is_none());
        assert!(trailing_slash_target(&parse("http://example.com")).unwrap().is_none());
    }

    #[test]
    fn test_with_query_match_discards_request_query() {
        let rules = vec![url_rule("r1", "/old?lang=en", "/new")];
        assert_eq!(
            rewrite("http://example.com/old?lang=en", &rules).as_deref(),
            Some("http://example.com/new")
        );
    }

    #[test]
    fn test_with_query_match_uses_target_query() {
        let rules = vec![url_rule("r1", "/old?lang=en", "/new?l=1")];
        assert_eq!(
            rewrite("http://example.com/old?LANG=EN", &rules).as_deref(),
            Some("http://example.com/new?l=1")
        );
    }

    #[test]
    fn test_without_query_match_preserves_request_query() {
        let rules = vec![url_rule("r1", "/old", "/new?ignored=1")];
        assert_eq!(
            rewrite("http://example.com/old?page=2&sort=asc", &rules).as_deref(),
            Some("http://example.com/new?page=2&sort=asc")
        );

        // Without a request query the with-query mask already matches.
        assert_eq!(
            rewrite("http://example.com/old", &rules).as_deref(),
            Some("http://example.com/new?ignored=1")
        );
    }

    #[test]
    fn test_with_query_mask_is_tried_first() {
        let rules = vec![
            url_rule("general", "/old", "/general"),
            url_rule("specific", "/old?id=7", "/specific"),
        ];
        assert_eq!(
            rewrite("http://example.com/old?id=7", &rules).as_deref(),
            Some("http://example.com/specific")
        );
        assert_eq!(
            rewrite("http://example.com/old?id=8", &rules).as_deref(),
            Some("http://example.com/general?id=8")
        );
    }

    #[test]
    fn test_first_rule_in_load_order_wins() {
        let rules = vec![
            url_rule("first", "/same", "/one"),
            url_rule("second", "/same", "/two"),
        ];
        let request = parse("http://example.com/same");
        let matched = match_url_rule(&request, &rules).unwrap().unwrap();
        assert_eq!(matched.rule.id, "first");
    }

    #[test]
    fn test_match_is_case_insensitive_and_unescaped() {
        let rules = vec![url_rule("r1", "/About Us", "/about")];
        assert_eq!(
            rewrite("http://Example.com/about%20us", &rules).as_deref(),
            Some("http://example.com/about")
        );
    }

    #[test]
    fn test_rule_with_explicit_host_only_matches_that_host() {
        let rules = vec![url_rule("r1", "http://shop.example.com/cart", "https://store.example.com/basket")];
        assert_eq!(
            rewrite("http://shop.example.com/cart", &rules).as_deref(),
            Some("https://store.example.com/basket")
        );
        assert_eq!(rewrite("http://www.example.com/cart", &rules), None);
    }

    #[test]
    fn test_no_match() {
        let rules = vec![url_rule("r1", "/old", "/new")];
        assert_eq!(rewrite("http://example.com/other", &rules), None);
        assert_eq!(rewrite("http://example.com/other", &[]), None);
    }

    #[test]
    fn test_corrupt_cached_rule_is_reported() {
        let mut rule = url_rule("broken", "/old", "/new");
        rule.source.host = Some("bad host".into());

        let err = match_url_rule(&parse("http://example.com/old"), &[rule]).unwrap_err();
        assert!(err.is_cache_inconsistent());
    }

    #[test]
    fn test_host_rule() {
        let rules = vec![
            host_rule("h1", "old.example.com", "new.example.com"),
            host_rule("h2", "OLD.example.com", "other.example.com"),
        ];
        let request = parse("http://Old.Example.com:8080/a/b?x=1");
        let rule = match_host_rule(&request, &rules).unwrap().unwrap();
        assert_eq!(rule.id, "h1");
        assert_eq!(
            host_rule_target(&request, rule).unwrap().as_str(),
            "http://new.example.com/a/b?x=1"
        );

        assert!(match_host_rule(&parse("http://www.example.com/"), &rules).unwrap().is_none());
    }
}
