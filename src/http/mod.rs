//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout)
//!     → middleware.rs (rebuild URL, evaluate rules)
//!         → 301 + Location, empty body
//!         → or upstream.rs (forward to application, else 404)
//!     → Send to client
//! ```

pub mod middleware;
pub mod server;
pub mod upstream;

pub use server::{AppState, HttpServer};
