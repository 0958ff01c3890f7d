use crate::error::ServerResult;
use crate::state::ServerState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use gec::{CorrectionRequest, CorrectionResult, ServiceMetrics};
use std::sync::Arc;

/// Correct one sentence (POST /correct)
///
/// Body: `{"input": "...", "top_k": 3, "use_retrieval": true}`; only `input`
/// is required.
pub async fn correct(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<CorrectionRequest>, JsonRejection>,
) -> ServerResult<Json<CorrectionResult>> {
    let Json(request) = payload?;
    let result = state.service.correct(request).await?;
    Ok(Json(result))
}

/// Cache counters and support index size (GET /metrics)
pub async fn metrics(State(state): State<Arc<ServerState>>) -> Json<ServiceMetrics> {
    Json(state.service.metrics())
}
