//! Rewrite subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (scheme, host, path, query, method)
//!     → site.rs (eligibility)
//!     → recovery.rs (forced "not found" unwrap)
//!     → engine.rs (trailing slash, URL rules, hostname rules)
//!     → decision.rs (NoAction | RedirectTo)
//!     → http middleware answers 301 or passes the request on
//! ```
//!
//! # Design Decisions
//! - Matching is pure and synchronous; only rule loading touches I/O
//! - URLs are handled as parsed `url::Url` values, compared per component

pub mod decision;
pub mod engine;
pub mod pipeline;
pub mod recovery;
pub mod site;
pub mod url;

pub use decision::{Decision, Location};
pub use engine::MatchError;
pub use pipeline::{RewriteRequest, Rewriter, Stage};
pub use site::{IgnoreReason, SiteResolver};
