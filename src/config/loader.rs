//! Configuration loading from disk.

use std::path::Path;
use std::fs;
use crate::config::schema::RewriterServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<RewriterServiceConfig, ConfigError> {
    let config: RewriterServiceConfig = toml::from_str(content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load and validate configuration from a TOML file.
///
/// Relative rule and exception locations are resolved against the
/// directory holding the config file.
pub fn load_config(path: &Path) -> Result<RewriterServiceConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let mut config = parse_config(&content)?;

    if let Some(dir) = path.parent() {
        let rewriter = &mut config.rewriter;
        for location in [&mut rewriter.rules_location, &mut rewriter.exceptions_location] {
            if let Some(p) = location.as_mut().filter(|p| p.is_relative()) {
                *p = dir.join(&*p);
            }
        }
    }

    Ok(config)
}
