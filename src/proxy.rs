use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use axum::extract::{RawQuery, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use url::Url;

use crate::error::ProxyError;

pub type Client = reqwest::Client;

/// Where `/api/data` forwards to. Built once at startup.
#[derive(Debug, Clone)]
pub struct Upstream {
    pub base: Url,
    pub timeout: Option<Duration>,
}

#[derive(Clone)]
pub struct ProxyState {
    pub client: Client,
    pub upstream: Upstream,
}

pub async fn data(
    State(state): State<ProxyState>,
    RawQuery(query): RawQuery,
) -> Result<Response, ProxyError> {
    let params = parse_query(query.as_deref().unwrap_or(""));
    let target = target_url(&state.upstream.base, &params);

    tracing::debug!("forwarding to {}", target);

    let (status, body) = match state.upstream.timeout {
        Some(timeout) => tokio::time::timeout(timeout, fetch(&state.client, target))
            .await
            .map_err(|_| anyhow!("upstream timed out after {:?}", timeout))??,
        None => fetch(&state.client, target).await?,
    };

    Ok(relay(status, body))
}

async fn fetch(client: &Client, target: Url) -> Result<(StatusCode, String)> {
    let response = client.get(target).send().await?;
    let status = response.status();
    let body = response
        .text()
        .await
        .context("Failed to read upstream body")?;

    tracing::debug!("upstream answered {}", status);

    Ok((status, body))
}

/// JSON bodies go back as JSON, anything else as plain text.
fn relay(status: StatusCode, body: String) -> Response {
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(value) => (status, Json(value)).into_response(),
        Err(_) => (
            status,
            [(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )],
            body,
        )
            .into_response(),
    }
}

/// Collapses repeated keys to their last value, keeping first-seen order.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = Vec::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match params.iter().position(|(k, _)| *k == key) {
            Some(i) => params[i].1 = value.into_owned(),
            None => params.push((key.into_owned(), value.into_owned())),
        }
    }
    params
}

/// Sets each param on the base URL's query.
///
/// A key already present in the base is replaced where it first appears and
/// any later duplicates are dropped. New keys are appended. Base keys that
/// aren't overridden stay.
pub fn target_url(base: &Url, params: &[(String, String)]) -> Url {
    let mut pairs: Vec<(String, String)> = base
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    for (key, value) in params {
        match pairs.iter().position(|(k, _)| k == key) {
            Some(first) => {
                pairs[first].1 = value.clone();
                let mut index = 0;
                pairs.retain(|(k, _)| {
                    let keep = k != key || index == first;
                    index += 1;
                    keep
                });
            }
            None => pairs.push((key.clone(), value.clone())),
        }
    }

    let mut target = base.clone();
    if pairs.is_empty() {
        target.set_query(None);
    } else {
        target.query_pairs_mut().clear().extend_pairs(pairs);
    }
    target
}
