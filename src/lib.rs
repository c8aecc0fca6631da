pub mod config;
pub mod cors;
pub mod error;
pub mod health;
pub mod proxy;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{middleware, routing::get, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use url::Url;

pub use crate::config::Config;
use crate::cors::{cors_gate, CorsPolicy};
use crate::error::{handle_panic, not_found};
use crate::proxy::{Client, ProxyState, Upstream};

pub fn app(config: &Config) -> Result<Router> {
    let base = Url::parse(&config.finance_data_endpoint).with_context(|| {
        format!(
            "Invalid FINANCE_DATA_ENDPOINT: {}",
            config.finance_data_endpoint
        )
    })?;

    let state = ProxyState {
        client: Client::builder()
            .build()
            .context("Failed to build upstream client")?,
        upstream: Upstream {
            base,
            timeout: config.upstream_timeout(),
        },
    };

    let policy = Arc::new(CorsPolicy::from_config(config));
    if policy.is_open() {
        tracing::warn!("ALLOWED_ORIGINS is empty, every origin is allowed");
    }

    let router = Router::new()
        .route("/", get(health::root))
        .route("/api/health", get(health::health))
        .route("/api/data", get(proxy::data))
        .fallback(not_found)
        .with_state(state)
        // layers wrap everything registered above
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn_with_state(policy, cors_gate))
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
