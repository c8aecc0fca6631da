use std::net::{SocketAddr, TcpListener};
use std::sync::Once;
use std::time::Duration;

use axum::extract::RawQuery;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use finance_proxy::Config;

static TRACING_INITIALIZED: Once = Once::new();

// Help function to add tracing to tests
// Note: This is safe to use for multiple tests, but since tests are run concurrently the
// output may be interleaved
#[allow(dead_code)]
pub fn enable_tracing() {
    TRACING_INITIALIZED.call_once(|| {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "finance_proxy=trace".into()),
            )
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}

#[allow(dead_code)]
pub fn config(endpoint: &str) -> Config {
    Config {
        finance_data_endpoint: endpoint.to_string(),
        ..Config::default()
    }
}

#[allow(dead_code)]
pub fn restricted_config(endpoint: &str, allowed_origins: &[&str]) -> Config {
    Config {
        allowed_origins: allowed_origins.iter().map(|o| o.to_string()).collect(),
        ..config(endpoint)
    }
}

async fn echo(RawQuery(query): RawQuery) -> impl IntoResponse {
    Json(json!({ "query": query }))
}

async fn maintenance() -> impl IntoResponse {
    (StatusCode::SERVICE_UNAVAILABLE, "sheet is being recalculated")
}

async fn not_json() -> impl IntoResponse {
    (StatusCode::OK, "<html>script error</html>")
}

async fn moved(RawQuery(query): RawQuery) -> impl IntoResponse {
    Redirect::to(&format!("/exec?{}", query.unwrap_or_default()))
}

async fn slow() -> impl IntoResponse {
    tokio::time::sleep(Duration::from_secs(3)).await;
    Json(json!({ "late": true }))
}

/// A stand-in for the spreadsheet script, served on an ephemeral port.
#[allow(dead_code)]
pub fn spawn_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap()).unwrap();
    let addr = listener.local_addr().unwrap();

    let upstream = Router::new()
        .route("/exec", get(echo))
        .route("/maintenance", get(maintenance))
        .route("/html", get(not_json))
        .route("/moved", get(moved))
        .route("/slow", get(slow));

    tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(upstream.into_make_service())
            .await
            .unwrap();
    });

    addr
}

/// An address nothing is listening on.
#[allow(dead_code)]
pub fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap()).unwrap();
    listener.local_addr().unwrap()
}
