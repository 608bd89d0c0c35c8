//! Liveness endpoint

use axum::{Json, extract::State};

use crate::api::{state::ApiState, types::HealthResponse};

/// GET /health
///
/// Reports which generation is current and how many checks it runs. A
/// generation of 0 means the first load has not finished yet.
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let generation = state.current.load().await;

    Json(HealthResponse {
        status: "ok".to_string(),
        generation: generation.number(),
        checks: generation.checks().len(),
        timestamp: chrono::Utc::now(),
    })
}
