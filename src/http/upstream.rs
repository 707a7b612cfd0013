//! Pass-through for requests the rewriter leaves alone.
//!
//! # Responsibilities
//! - Forward the request to the configured upstream application
//! - Answer 404 when no upstream is configured
//!
//! # Design Decisions
//! - The `Host` header is forwarded untouched so the upstream sees the
//!   client-facing host
//! - Upstream failures map to 502, never retried

use std::str::FromStr;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{uri::Authority, uri::Scheme, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::http::server::AppState;

/// HTTP/1.1 client bound to one upstream address.
#[derive(Clone)]
pub struct Upstream {
    client: Client<HttpConnector, Body>,
    authority: Authority,
}

impl Upstream {
    /// Returns `None` if `address` is not a valid authority.
    pub fn new(address: &str) -> Option<Self> {
        let authority = Authority::from_str(address).ok()?;
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Some(Self { client, authority })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    fn target_uri(&self, uri: &Uri) -> Result<Uri, axum::http::Error> {
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
    }

    pub async fn forward(&self, request: Request) -> Response {
        let (mut parts, body) = request.into_parts();
        parts.uri = match self.target_uri(&parts.uri) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::warn!(uri = %parts.uri, error = %e, "Cannot build upstream URI");
                return (StatusCode::BAD_REQUEST, "Bad request").into_response();
            }
        };

        let request = Request::from_parts(parts, body);
        match self.client.request(request).await {
            Ok(response) => {
                let (parts, body) = response.into_parts();
                Response::from_parts(parts, Body::new(body))
            }
            Err(e) => {
                tracing::error!(upstream = %self.authority, error = %e, "Upstream error");
                (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
            }
        }
    }
}

/// Fallback handler behind the redirect middleware.
pub async fn pass_through(State(state): State<AppState>, request: Request) -> Response {
    match &state.upstream {
        Some(upstream) => upstream.forward(request).await,
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}
