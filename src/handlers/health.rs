//! Health check endpoint.

use axum::Json;
use serde_json::{Value, json};

/// Liveness probe. Deliberately cheap: no store round-trip.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "scanlink",
    }))
}
