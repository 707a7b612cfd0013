//! Rule source adapters.
//!
//! # Responsibilities
//! - Define the `RuleSource` seam the cache loads from
//! - Read rule records and the exceptions document from disk
//! - Hold records in memory for embedding and tests
//!
//! # Design Decisions
//! - Sources only fetch; validation and classification belong to the cache
//! - File format is picked by extension (`.json`, anything else is TOML)
//! - A missing exceptions location is an empty document, not an error

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::config::RewriterConfig;
use crate::rules::model::{RawRuleRecord, TypeExceptionDocument};

/// Failures surfaced by a rule source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("rule source location is not configured")]
    NotConfigured,

    #[error("rule source '{location}' is unavailable: {source}")]
    Unavailable {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("rule source '{location}' could not be parsed: {reason}")]
    Parse { location: String, reason: String },
}

/// External collaborator that owns rule storage.
pub trait RuleSource: Send + Sync {
    /// Return the full current set of raw rule records, in authored order.
    fn fetch_rules(&self) -> Result<Vec<RawRuleRecord>, SourceError>;

    /// Return the type-exception document.
    fn fetch_exceptions(&self) -> Result<TypeExceptionDocument, SourceError>;
}

/// Root shape of a rules file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RulesDocument {
    #[serde(alias = "rules")]
    rule: Vec<RawRuleRecord>,
}

/// Reads rules and exceptions from TOML or JSON files.
#[derive(Debug, Clone, Default)]
pub struct FileRuleSource {
    rules_location: Option<PathBuf>,
    exceptions_location: Option<PathBuf>,
}

impl FileRuleSource {
    pub fn new(rules_location: Option<PathBuf>, exceptions_location: Option<PathBuf>) -> Self {
        Self {
            rules_location,
            exceptions_location,
        }
    }

    pub fn from_config(config: &RewriterConfig) -> Self {
        Self::new(config.rules_location.clone(), config.exceptions_location.clone())
    }

    fn read(path: &Path) -> Result<String, SourceError> {
        fs::read_to_string(path).map_err(|source| SourceError::Unavailable {
            location: path.display().to_string(),
            source,
        })
    }

    fn parse<T: for<'de> Deserialize<'de>>(path: &Path, content: &str) -> Result<T, SourceError> {
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let parsed = if is_json {
            serde_json::from_str(content).map_err(|e| e.to_string())
        } else {
            toml::from_str(content).map_err(|e| e.to_string())
        };

        parsed.map_err(|reason| SourceError::Parse {
            location: path.display().to_string(),
            reason,
        })
    }
}

impl RuleSource for FileRuleSource {
    fn fetch_rules(&self) -> Result<Vec<RawRuleRecord>, SourceError> {
        let path = self.rules_location.as_deref().ok_or(SourceError::NotConfigured)?;
        let content = Self::read(path)?;
        let document: RulesDocument = Self::parse(path, &content)?;
        Ok(document.rule)
    }

    fn fetch_exceptions(&self) -> Result<TypeExceptionDocument, SourceError> {
        let Some(path) = self.exceptions_location.as_deref() else {
            return Ok(TypeExceptionDocument::default());
        };
        let content = Self::read(path)?;
        Self::parse(path, &content)
    }
}

/// In-memory rule source.
#[derive(Debug, Clone, Default)]
pub struct StaticRuleSource {
    rules: Vec<RawRuleRecord>,
    exceptions: TypeExceptionDocument,
}

impl StaticRuleSource {
    pub fn new(rules: Vec<RawRuleRecord>, exceptions: TypeExceptionDocument) -> Self {
        Self { rules, exceptions }
    }
}

impl RuleSource for StaticRuleSource {
    fn fetch_rules(&self) -> Result<Vec<RawRuleRecord>, SourceError> {
        Ok(self.rules.clone())
    }

    fn fetch_exceptions(&self) -> Result<TypeExceptionDocument, SourceError> {
        Ok(self.exceptions.clone())
    }
}
