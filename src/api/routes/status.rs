//! Check status endpoints

use axum::{
    Json,
    extract::{Path, State},
};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{CheckInfo, StatusResponse},
};

/// GET /status
///
/// Every check of the current generation, sorted by id
pub async fn list_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let generation = state.current.load().await;

    let mut checkdata = Vec::with_capacity(generation.checks().len());
    for check in generation.checks() {
        let status = generation
            .snapshot()
            .get(check.id())
            .await
            .unwrap_or_default();
        checkdata.push(CheckInfo::new(check, status));
    }
    checkdata.sort_by(|a, b| a.id.cmp(&b.id));

    Json(StatusResponse {
        generation: generation.number(),
        checkdata,
    })
}

/// GET /status/:id
pub async fn get_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CheckInfo>> {
    let generation = state.current.load().await;

    let check = generation
        .check(&id)
        .ok_or_else(|| ApiError::NotFound(format!("check '{id}' not found")))?;
    let status = generation.snapshot().get(&id).await.unwrap_or_default();

    Ok(Json(CheckInfo::new(check, status)))
}
