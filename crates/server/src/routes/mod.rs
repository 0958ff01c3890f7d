//! API route handlers
//!
//! - `correct`: sentence correction and cache metrics
//! - `health`: liveness, readiness and Prometheus exposition

pub mod correct;
pub mod health;

use crate::error::{ServerError, ServerResult};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// Server name, version and routes (GET /)
pub async fn api_info() -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({
        "name": "GEC Server",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "POST /correct",
            "GET /metrics",
            "GET /health",
            "GET /ready",
            "GET /metrics/prometheus"
        ]
    })))
}

/// 404 Not Found handler
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
