//! Aggregate and alternative-data fetch endpoints
//!
//! Both accept `?client=<id>`: a new request for the same client and symbol
//! supersedes (cancels) the one still in flight, which then answers 409.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use super::symbol_param;
use crate::error::ApiResult;
use crate::services::{AggregateError, AggregateResult, AlternativeData, RunKind};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct FetchQuery {
    /// Caller identity scoping supersession (e.g. a browser tab id)
    pub client: Option<String>,
    /// Sort merged records newest transaction first
    #[serde(default)]
    pub sort_by_date: bool,
}

/// GET /symbols/:symbol/aggregate
pub async fn get_aggregate(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<FetchQuery>,
) -> ApiResult<Json<AggregateResult>> {
    let symbol = symbol_param(&symbol)?;
    let run = state
        .runs
        .begin(query.client.as_deref(), RunKind::Aggregate, &symbol)
        .await;

    let result = state.fetcher.fetch_aggregate(&symbol, run.token()).await;
    state.runs.finish(&run).await;

    if let Err(e @ AggregateError::CoreSliceUnavailable { .. }) = &result {
        state.record_error(e.to_string()).await;
    }

    Ok(Json(result?))
}

/// GET /symbols/:symbol/alternative
pub async fn get_alternative(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<FetchQuery>,
) -> ApiResult<Json<AlternativeData>> {
    let symbol = symbol_param(&symbol)?;
    let run = state
        .runs
        .begin(query.client.as_deref(), RunKind::Alternative, &symbol)
        .await;

    let result = state.fetcher.fetch_alternative_data(&symbol, run.token()).await;
    state.runs.finish(&run).await;

    let mut data = result?;
    if query.sort_by_date {
        data.congressional_trades.sort_by_transaction_date_desc();
    }

    info!(symbol = %symbol, records = data.congressional_trades.records.len(), "Alternative data served");
    Ok(Json(data))
}

pub fn aggregate_routes() -> Router<AppState> {
    Router::new()
        .route("/symbols/:symbol/aggregate", get(get_aggregate))
        .route("/symbols/:symbol/alternative", get(get_alternative))
}
