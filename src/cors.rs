//! Origin gate.
//!
//! Every request passes through [`cors_gate`]. Allowed requests get
//! permissive `Access-Control-*` headers. Rejected requests simply don't,
//! which leaves it to the browser to block the page from reading the
//! response. Rejection never produces an error status.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ORIGIN, VARY,
};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::config::Config;

/// The `Origin` value browsers send from non-network contexts such as file:// pages.
pub const NULL_ORIGIN: &str = "null";

pub const ALLOWED_METHODS: &str = "GET,POST,OPTIONS";
pub const ALLOWED_HEADERS: &str = "Content-Type,Accept,Authorization,Cache-Control,Pragma";

#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_origins: HashSet<String>,
    allow_null_origin: bool,
}

impl CorsPolicy {
    pub fn new<I, S>(allowed_origins: I, allow_null_origin: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_origins: allowed_origins.into_iter().map(Into::into).collect(),
            allow_null_origin,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.allowed_origins.iter().cloned(), config.allow_null_origin)
    }

    /// An empty allow-list means open mode.
    pub fn is_open(&self) -> bool {
        self.allowed_origins.is_empty()
    }

    pub fn is_allowed(&self, origin: Option<&str>) -> bool {
        let origin = match origin {
            // no Origin header: curl, server-to-server
            None | Some("") => return true,
            Some(origin) => origin,
        };

        if origin == NULL_ORIGIN && self.allow_null_origin {
            return true;
        }

        self.is_open() || self.allowed_origins.contains(origin)
    }

    /// Returns the headers to attach, or `None` when the origin is rejected.
    pub fn allow_headers(&self, request_headers: &HeaderMap) -> Option<HeaderMap> {
        let origin = match request_headers.get(ORIGIN) {
            None => None,
            // non-ASCII origins can never match the allow-list
            Some(value) => Some(value.to_str().ok()?),
        };

        if !self.is_allowed(origin) {
            tracing::debug!("origin rejected: {:?}", origin);
            return None;
        }

        let allow_origin = match origin {
            Some(origin) if !origin.is_empty() => HeaderValue::from_str(origin).ok()?,
            _ => HeaderValue::from_static("*"),
        };

        let mut headers = HeaderMap::new();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        );

        Some(headers)
    }
}

/// Answers preflights directly and decorates every other response.
pub async fn cors_gate<B>(
    State(policy): State<Arc<CorsPolicy>>,
    req: Request<B>,
    next: Next<B>,
) -> Response {
    let cors_headers = policy.allow_headers(req.headers());

    let mut response = if req.method() == Method::OPTIONS {
        tracing::trace!("preflight for {}", req.uri());
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };

    let headers = response.headers_mut();
    headers.append(VARY, HeaderValue::from_static("Origin"));
    if let Some(cors_headers) = cors_headers {
        headers.extend(cors_headers);
    }

    response
}
