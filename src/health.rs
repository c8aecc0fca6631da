use axum::Json;
use serde_json::{json, Value};

pub async fn root() -> &'static str {
    "ok"
}

pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}
