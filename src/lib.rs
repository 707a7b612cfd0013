//! URL rewrite and redirect engine.
//!
//! Sits in front of a web application and answers requests matching
//! configured rules with a permanent redirect; everything else is passed
//! through to the application.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod rewrite;
pub mod rules;

pub use config::schema::RewriterServiceConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use rewrite::{Decision, RewriteRequest, Rewriter};
pub use rules::RuleCache;
