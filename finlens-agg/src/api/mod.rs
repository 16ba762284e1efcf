//! HTTP API handlers for finlens-agg
//!
//! REST endpoints for aggregate fetches, saved artifacts and generation, plus
//! an SSE stream of status events.

pub mod aggregate;
pub mod artifacts;
pub mod generate;
pub mod health;
pub mod sse;

pub use aggregate::aggregate_routes;
pub use artifacts::artifact_routes;
pub use generate::generate_routes;
pub use health::health_routes;
pub use sse::event_stream;

use crate::error::ApiError;
use crate::types::normalize_symbol;

/// Validated upper-case symbol from a path segment
pub(crate) fn symbol_param(raw: &str) -> Result<String, ApiError> {
    normalize_symbol(raw).ok_or_else(|| ApiError::BadRequest(format!("Invalid symbol: {}", raw)))
}
