//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub scorer: &'static str,
    pub persistent: bool,
}

/// `GET /api/health`: liveness plus the active scorer backend.
pub async fn check(State(ctx): State<ApiContext>) -> Result<Json<HealthResponse>, ApiError> {
    Ok(Json(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
        scorer: ctx.core.orchestrator().scorer_name(),
        persistent: ctx.core.db_path.is_some(),
    }))
}
