//! Report and prediction generation endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};

use super::symbol_param;
use crate::error::{ApiError, ApiResult};
use crate::services::{GeneratedArtifact, GenerationError};
use crate::AppState;

async fn record_failure(state: &AppState, err: &GenerationError) {
    match err {
        GenerationError::Cancelled => {}
        other => state.record_error(other.to_string()).await,
    }
}

/// POST /owners/:owner/reports/:symbol
pub async fn generate_report(
    State(state): State<AppState>,
    Path((owner, symbol)): Path<(String, String)>,
) -> ApiResult<(StatusCode, Json<GeneratedArtifact>)> {
    let symbol = symbol_param(&symbol)?;
    let cancel = state.shutdown.child_token();

    match state.generator.generate_report(&owner, &symbol, &cancel).await {
        Ok(artifact) => Ok((StatusCode::CREATED, Json(artifact))),
        Err(e) => {
            record_failure(&state, &e).await;
            Err(ApiError::from(e))
        }
    }
}

/// POST /owners/:owner/predictions/:symbol
pub async fn generate_prediction(
    State(state): State<AppState>,
    Path((owner, symbol)): Path<(String, String)>,
) -> ApiResult<(StatusCode, Json<GeneratedArtifact>)> {
    let symbol = symbol_param(&symbol)?;
    let cancel = state.shutdown.child_token();

    match state.generator.generate_prediction(&owner, &symbol, &cancel).await {
        Ok(artifact) => Ok((StatusCode::CREATED, Json(artifact))),
        Err(e) => {
            record_failure(&state, &e).await;
            Err(ApiError::from(e))
        }
    }
}

pub fn generate_routes() -> Router<AppState> {
    Router::new()
        .route("/owners/:owner/reports/:symbol", post(generate_report))
        .route("/owners/:owner/predictions/:symbol", post(generate_prediction))
}
