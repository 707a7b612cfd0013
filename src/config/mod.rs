//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RewriterServiceConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On rules/exceptions file change:
//!     watcher.rs detects change
//!     → RuleCache cleared
//!     → next request reloads rules lazily
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - Rule files are data, not config, and are reloaded without restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::RewriterServiceConfig;
pub use schema::ListenerConfig;
pub use schema::RewriterConfig;
pub use schema::SiteConfig;
pub use schema::UpstreamConfig;
