//! Rule value types.
//!
//! # Responsibilities
//! - Represent raw rule records as authored in the rule source
//! - Convert raw records into validated URL and hostname rules
//! - Represent type exceptions used to recover forced "not found" requests
//!
//! # Design Decisions
//! - Rules are immutable once constructed
//! - A rule that cannot compose an absolute URL is rejected at load time,
//!   so composition failures during matching point at a corrupt cache

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::rewrite::url::{base_url, with_path_and_query, UrlBuildError};

/// Reasons a raw record is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("unknown rule kind '{0}'")]
    UnknownKind(String),
    #[error("source path is empty")]
    MissingSourcePath,
    #[error("target path is empty")]
    MissingTargetPath,
    #[error("source and target hostnames must both be set")]
    MissingHostName,
    #[error("invalid URL components: {0}")]
    InvalidComponents(String),
}

impl From<UrlBuildError> for RuleError {
    fn from(err: UrlBuildError) -> Self {
        RuleError::InvalidComponents(err.to_string())
    }
}

/// The declared kind of a raw rule record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Url,
    HostName,
}

impl RuleKind {
    /// Parse a kind name, ignoring case.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "url" | "url_rewrite" => Some(RuleKind::Url),
            "hostname" | "host_name" | "hostname_rewrite" => Some(RuleKind::HostName),
            _ => None,
        }
    }
}

/// A rule record exactly as delivered by a rule source.
///
/// `source` and `target` are shorthands (`/old?x=1` or `https://host/old`)
/// that fill any component not set explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RawRuleRecord {
    pub id: String,
    pub kind: String,

    pub source: Option<String>,
    pub source_scheme: Option<String>,
    pub source_host: Option<String>,
    pub source_path: Option<String>,
    pub source_query: Option<String>,

    pub target: Option<String>,
    pub target_scheme: Option<String>,
    pub target_host: Option<String>,
    pub target_path: Option<String>,
    pub target_query: Option<String>,

    pub source_host_name: Option<String>,
    pub target_host_name: Option<String>,
}

impl RawRuleRecord {
    /// Declared kind, if recognised.
    pub fn rule_kind(&self) -> Result<RuleKind, RuleError> {
        RuleKind::parse(&self.kind).ok_or_else(|| RuleError::UnknownKind(self.kind.clone()))
    }
}

/// One side (source or target) of a URL rewrite rule.
///
/// Scheme and host are optional; when absent they are taken from the
/// inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleUrl {
    pub scheme: Option<String>,
    pub host: Option<String>,
    pub path: String,
    pub query: Option<String>,
}

impl RuleUrl {
    fn from_parts(
        shorthand: Option<&str>,
        scheme: Option<&str>,
        host: Option<&str>,
        path: Option<&str>,
        query: Option<&str>,
    ) -> Result<Self, RuleError> {
        let mut url = match shorthand.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => Self::parse_shorthand(s)?,
            None => Self::default(),
        };

        if let Some(scheme) = non_empty(scheme) {
            url.scheme = Some(scheme.to_string());
        }
        if let Some(host) = non_empty(host) {
            url.host = Some(host.to_string());
        }
        if let Some(path) = non_empty(path) {
            url.path = path.to_string();
        }
        if let Some(query) = non_empty(query) {
            url.query = Some(query.to_string());
        }
        url.query = url
            .query
            .map(|q| q.trim_start_matches('?').to_string())
            .filter(|q| !q.is_empty());

        Ok(url)
    }

    fn parse_shorthand(s: &str) -> Result<Self, RuleError> {
        if s.contains("://") {
            let url = Url::parse(s).map_err(|e| RuleError::InvalidComponents(format!("{s}: {e}")))?;
            return Ok(Self {
                scheme: Some(url.scheme().to_string()),
                host: url.host_str().map(str::to_string),
                path: url.path().to_string(),
                query: url.query().map(str::to_string),
            });
        }

        let (path, query) = match s.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (s, None),
        };
        Ok(Self {
            scheme: None,
            host: None,
            path: path.to_string(),
            query,
        })
    }

    /// Compose an absolute URL, filling scheme/host from `request` where unset.
    pub fn resolve(&self, request: &Url) -> Result<Url, UrlBuildError> {
        let scheme = self.scheme.as_deref().unwrap_or(request.scheme());
        let host = match self.host.as_deref() {
            Some(host) => host,
            None => request.host_str().ok_or(UrlBuildError::MissingHost)?,
        };
        let base = base_url(scheme, host)?;
        Ok(with_path_and_query(base, &self.path, self.query.as_deref()))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A rule mapping a source URL shape to a target URL shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRewriteRule {
    pub id: String,
    pub source: RuleUrl,
    pub target: RuleUrl,
}

impl UrlRewriteRule {
    /// Build a rule from a raw record, rejecting it if invalid.
    pub fn from_record(record: &RawRuleRecord) -> Result<Self, RuleError> {
        let source = RuleUrl::from_parts(
            record.source.as_deref(),
            record.source_scheme.as_deref(),
            record.source_host.as_deref(),
            record.source_path.as_deref(),
            record.source_query.as_deref(),
        )?;
        let target = RuleUrl::from_parts(
            record.target.as_deref(),
            record.target_scheme.as_deref(),
            record.target_host.as_deref(),
            record.target_path.as_deref(),
            record.target_query.as_deref(),
        )?;

        let rule = Self {
            id: record.id.clone(),
            source,
            target,
        };
        rule.validate()?;
        Ok(rule)
    }

    /// Both paths must be set and both sides must compose into a URL.
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.source.path.trim().is_empty() {
            return Err(RuleError::MissingSourcePath);
        }
        if self.target.path.trim().is_empty() {
            return Err(RuleError::MissingTargetPath);
        }

        // Prove both sides compose against a stand-in request.
        let probe = base_url("http", "localhost")?;
        self.source.resolve(&probe)?;
        self.target.resolve(&probe)?;
        Ok(())
    }

    /// The URL this rule matches for the given request.
    pub fn source_url(&self, request: &Url) -> Result<Url, UrlBuildError> {
        self.source.resolve(request)
    }

    /// The URL this rule redirects to for the given request.
    pub fn target_url(&self, request: &Url) -> Result<Url, UrlBuildError> {
        self.target.resolve(request)
    }
}

/// A rule that swaps the request hostname and keeps path and query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostNameRewriteRule {
    pub id: String,
    pub source_host_name: String,
    pub target_host_name: String,
}

impl HostNameRewriteRule {
    pub fn from_record(record: &RawRuleRecord) -> Result<Self, RuleError> {
        let rule = Self {
            id: record.id.clone(),
            source_host_name: non_empty(record.source_host_name.as_deref())
                .unwrap_or_default()
                .to_string(),
            target_host_name: non_empty(record.target_host_name.as_deref())
                .unwrap_or_default()
                .to_string(),
        };
        rule.validate()?;
        Ok(rule)
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        if self.source_host_name.is_empty() || self.target_host_name.is_empty() {
            return Err(RuleError::MissingHostName);
        }
        base_url("http", &self.target_host_name)?;
        Ok(())
    }

    /// Case-insensitive hostname comparison.
    pub fn matches_host(&self, host: &str) -> bool {
        self.source_host_name.eq_ignore_ascii_case(host)
    }
}

/// Marks a class of requests that must be recovered from "not found" handling.
///
/// A URL matches when it contains `name` and at least one of `sub_types`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TypeException {
    pub name: String,
    pub sub_types: Vec<String>,
}

impl TypeException {
    /// Usable exceptions need a name and at least one non-empty subtype.
    pub fn is_usable(&self) -> bool {
        !self.name.is_empty() && self.sub_types.iter().any(|s| !s.is_empty())
    }

    /// True if `url` contains the type marker.
    pub fn applies_to(&self, url: &str) -> bool {
        !self.name.is_empty() && url.contains(self.name.as_str())
    }

    /// True if `url` contains `sub_type`. Empty subtypes never match.
    pub fn sub_type_matches(sub_type: &str, url: &str) -> bool {
        !sub_type.is_empty() && url.contains(sub_type)
    }
}

/// The full exceptions document as delivered by a rule source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TypeExceptionDocument {
    #[serde(rename = "type_exception", alias = "type_exceptions")]
    pub type_exceptions: Vec<TypeException>,
}
