//! Saved artifact endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde_json::Value;
use uuid::Uuid;

use super::symbol_param;
use crate::db::{ArtifactKind, SaveOutcome, SavedArtifact};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

fn kind_param(raw: &str) -> ApiResult<ArtifactKind> {
    raw.parse::<ArtifactKind>().map_err(ApiError::from)
}

/// PUT /owners/:owner/artifacts/:kind/:symbol
///
/// Body is the artifact payload. Re-saving the same symbol updates in place.
pub async fn save_artifact(
    State(state): State<AppState>,
    Path((owner, kind, symbol)): Path<(String, String, String)>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<SaveOutcome>> {
    let kind = kind_param(&kind)?;
    let symbol = symbol_param(&symbol)?;
    let outcome = state.store.save(&owner, kind, &symbol, &payload).await?;
    Ok(Json(outcome))
}

/// GET /owners/:owner/artifacts/:kind
pub async fn list_artifacts(
    State(state): State<AppState>,
    Path((owner, kind)): Path<(String, String)>,
) -> ApiResult<Json<Vec<SavedArtifact>>> {
    let kind = kind_param(&kind)?;
    Ok(Json(state.store.list(&owner, kind).await?))
}

/// GET /artifacts/:id
pub async fn get_artifact(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SavedArtifact>> {
    state
        .store
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Artifact {}", id)))
}

/// DELETE /artifacts/:id
pub async fn delete_artifact(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.store.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Artifact {}", id)))
    }
}

pub fn artifact_routes() -> Router<AppState> {
    Router::new()
        .route("/owners/:owner/artifacts/:kind", get(list_artifacts))
        .route("/owners/:owner/artifacts/:kind/:symbol", put(save_artifact))
        .route("/artifacts/:id", get(get_artifact).delete(delete_artifact))
}
