//! Rewrite rule subsystem.
//!
//! # Data Flow
//! ```text
//! RuleSource (file, memory, ...)
//!     → source.rs (fetch raw records + exceptions document)
//!     → model.rs (validate, classify into URL / hostname rules)
//!     → cache.rs (publish immutable RuleSet snapshot)
//!     → rewrite pipeline reads snapshots per request
//!
//! On clear signal (admin API, watcher, corrupt cache):
//!     → cache.rs drops snapshot
//!     → next request reloads lazily
//! ```
//!
//! # Design Decisions
//! - Invalid records are dropped and logged, never fatal
//! - Load order is preserved; it is the tie-break between overlapping rules
//! - The cache is a derived view, nothing is persisted

pub mod cache;
pub mod model;
pub mod source;

pub use cache::{CacheError, CacheStatus, ExceptionSet, RuleCache, RuleSet};
pub use model::{
    HostNameRewriteRule, RawRuleRecord, RuleError, RuleKind, RuleUrl, TypeException,
    TypeExceptionDocument, UrlRewriteRule,
};
pub use source::{FileRuleSource, RuleSource, SourceError, StaticRuleSource};
