//! `GET /health` — liveness.

use axum::Json;
use serde_json::{json, Value};

/// Static liveness response.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
