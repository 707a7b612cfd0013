//! Redirect middleware.
//!
//! # Responsibilities
//! - Rebuild the absolute request URL as the client saw it
//! - Ask the rewriter for a decision
//! - Answer `301 Moved Permanently` or hand the request on
//!
//! # Design Decisions
//! - `X-Forwarded-Proto` wins over the configured default scheme, since TLS
//!   usually terminates in front of us
//! - Rule loading is blocking file I/O; only evaluations that find a
//!   snapshot missing run on the blocking pool, and only those load
//! - A redirect that cannot be expressed as a header degrades to pass-through

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use url::Url;

use crate::http::server::AppState;
use crate::rewrite::{Decision, Location, RewriteRequest};

pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

pub async fn redirect_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let default_scheme = &state.rewriter.config().default_scheme;
    let Some(url) = request_url(&request, default_scheme) else {
        tracing::debug!(uri = %request.uri(), "Cannot rebuild request URL, skipping rewrite");
        return next.run(request).await;
    };

    let rewrite = RewriteRequest::new(request.method().clone(), url);
    let decision = match state.rewriter.evaluate_cached(&rewrite) {
        Some(decision) => decision,
        None => {
            let rewriter = state.rewriter.clone();
            match tokio::task::spawn_blocking(move || rewriter.evaluate(&rewrite)).await {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::error!(error = %e, "Rewrite evaluation task failed");
                    Decision::NoAction
                }
            }
        }
    };

    match decision {
        Decision::RedirectTo(location) => match redirect_response(&location) {
            Some(response) => response,
            None => {
                tracing::warn!(location = %location, "Redirect target is not a valid header value");
                next.run(request).await
            }
        },
        Decision::NoAction => next.run(request).await,
    }
}

/// Absolute URL of `request`, or `None` when no host is known.
pub fn request_url<B>(request: &axum::http::Request<B>, default_scheme: &str) -> Option<Url> {
    let scheme = forwarded_scheme(request.headers()).unwrap_or(default_scheme);

    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))
        .filter(|h| !h.is_empty())?;

    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    Url::parse(&format!("{scheme}://{host}{path_and_query}")).ok()
}

fn forwarded_scheme(headers: &HeaderMap) -> Option<&'static str> {
    let value = headers.get(X_FORWARDED_PROTO)?.to_str().ok()?;
    // Proxy chains append, the first entry is the client-facing one.
    let first = value.split(',').next()?.trim();
    if first.eq_ignore_ascii_case("https") {
        Some("https")
    } else if first.eq_ignore_ascii_case("http") {
        Some("http")
    } else {
        None
    }
}

fn redirect_response(location: &Location) -> Option<Response> {
    let value = HeaderValue::from_str(location.as_str()).ok()?;
    Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(header::LOCATION, value)
        .body(Body::empty())
        .ok()
}
