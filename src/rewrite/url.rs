//! URL component masks.
//!
//! # Responsibilities
//! - Select a subset of scheme/host/path/query from a URL
//! - Compare two URLs under a mask (case-insensitive, unescaped)
//! - Build bare `scheme://host/` URLs for rule composition
//!
//! # Design Decisions
//! - Host never carries the port; ports are not part of any mask
//! - Path and query are percent-decoded before comparison
//! - Empty query is treated the same as an absent one

use std::ops::BitOr;

use percent_encoding::percent_decode_str;
use thiserror::Error;
use url::Url;

/// Errors raised while composing a URL from components.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrlBuildError {
    #[error("URL has no host")]
    MissingHost,
    #[error("cannot compose '{0}' into an absolute URL")]
    Invalid(String),
}

/// A set of URL components used when comparing or composing URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Components(u8);

impl Components {
    pub const SCHEME: Self = Self(0b0001);
    pub const HOST: Self = Self(0b0010);
    pub const PATH: Self = Self(0b0100);
    pub const QUERY: Self = Self(0b1000);

    /// Scheme, host and path.
    pub const WITHOUT_QUERY: Self = Self(0b0111);
    /// Scheme, host, path and query.
    pub const WITH_QUERY: Self = Self(0b1111);

    /// Returns true if every component of `other` is part of this mask.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Components {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Render the selected components of `url` in unescaped form.
pub fn components(url: &Url, mask: Components) -> String {
    let mut out = String::new();

    if mask.contains(Components::SCHEME) {
        out.push_str(url.scheme());
        out.push_str(if mask.contains(Components::HOST) { "://" } else { ":" });
    }
    if mask.contains(Components::HOST) {
        out.push_str(url.host_str().unwrap_or_default());
    }
    if mask.contains(Components::PATH) {
        out.push_str(&percent_decode_str(url.path()).decode_utf8_lossy());
    }
    if mask.contains(Components::QUERY) {
        if let Some(query) = url.query().filter(|q| !q.is_empty()) {
            out.push('?');
            out.push_str(&percent_decode_str(query).decode_utf8_lossy());
        }
    }

    out
}

/// Compare two URLs on the given components, ignoring case.
pub fn equal_components(a: &Url, b: &Url, mask: Components) -> bool {
    let left = components(a, mask);
    let right = components(b, mask);
    left.chars()
        .flat_map(char::to_lowercase)
        .eq(right.chars().flat_map(char::to_lowercase))
}

/// Build `scheme://host/` with nothing else attached.
pub fn base_url(scheme: &str, host: &str) -> Result<Url, UrlBuildError> {
    let raw = format!("{}://{}/", scheme.trim(), host.trim());
    let url = Url::parse(&raw).map_err(|_| UrlBuildError::Invalid(raw.clone()))?;

    // Reject inputs that smuggled a port, credentials or a path into the host.
    if url.cannot_be_a_base()
        || url.host_str().is_none()
        || url.port().is_some()
        || !url.username().is_empty()
        || url.path() != "/"
        || url.query().is_some()
    {
        return Err(UrlBuildError::Invalid(raw));
    }
    Ok(url)
}

/// Replace the path and query of `url`, treating an empty query as none.
pub fn with_path_and_query(mut url: Url, path: &str, query: Option<&str>) -> Url {
    url.set_path(path);
    url.set_query(query.filter(|q| !q.is_empty()));
    url.set_fragment(None);
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_components_masks() {
        let url = parse("https://Example.com:8443/a%20b/c?x=1&y=%2F");

        assert_eq!(
            components(&url, Components::WITHOUT_QUERY),
            "https://example.com/a b/c"
        );
        assert_eq!(
            components(&url, Components::WITH_QUERY),
            "https://example.com/a b/c?x=1&y=/"
        );
        assert_eq!(
            components(&url, Components::SCHEME | Components::HOST),
            "https://example.com"
        );
        assert_eq!(components(&url, Components::QUERY), "?x=1&y=/");
    }

    #[test]
    fn test_empty_query_is_ignored() {
        let url = parse("http://example.com/a?");
        assert_eq!(components(&url, Components::WITH_QUERY), "http://example.com/a");
    }

    #[test]
    fn test_equal_components_case_insensitive() {
        let a = parse("http://example.com/About?Lang=EN");
        let b = parse("http://EXAMPLE.com/about?lang=en");
        assert!(equal_components(&a, &b, Components::WITH_QUERY));

        let c = parse("http://example.com/about?lang=nl");
        assert!(!equal_components(&a, &c, Components::WITH_QUERY));
        assert!(equal_components(&a, &c, Components::WITHOUT_QUERY));
    }

    #[test]
    fn test_port_is_not_a_component() {
        let a = parse("http://example.com:8080/a");
        let b = parse("http://example.com/a");
        assert!(equal_components(&a, &b, Components::WITH_QUERY));
    }

    #[test]
    fn test_base_url() {
        let url = base_url("https", "new.example.com").unwrap();
        assert_eq!(url.as_str(), "https://new.example.com/");

        assert!(base_url("http", "").is_err());
        assert!(base_url("http", "host:8080").is_err());
        assert!(base_url("http", "host/path").is_err());
        assert!(base_url("http", "user@host").is_err());
    }

    #[test]
    fn test_with_path_and_query() {
        let base = base_url("http", "example.com").unwrap();
        let url = with_path_and_query(base.clone(), "/a/b", Some("x=1"));
        assert_eq!(url.as_str(), "http://example.com/a/b?x=1");

        let url = with_path_and_query(base, "a", Some(""));
        assert_eq!(url.as_str(), "http://example.com/a");
    }
}
