//! Server-Sent Events stream of fetch and artifact events
//!
//! `GET /events?symbol=AAPL` narrows the stream to one symbol's slice and
//! aggregate events; artifact events are always forwarded.

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use finlens_common::events::FinlensEvent;
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    pub symbol: Option<String>,
}

fn matches_symbol(event: &FinlensEvent, wanted: Option<&str>) -> bool {
    let Some(wanted) = wanted else {
        return true;
    };
    match event {
        FinlensEvent::SliceStatusChanged { symbol, .. }
        | FinlensEvent::AggregateCompleted { symbol, .. }
        | FinlensEvent::AggregateFailed { symbol, .. } => symbol.eq_ignore_ascii_case(wanted),
        FinlensEvent::ArtifactSaved { .. } | FinlensEvent::ArtifactDeleted { .. } => true,
    }
}

/// GET /events
pub async fn event_stream(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(symbol = ?filter.symbol, "New SSE client connected");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !matches_symbol(&event, filter.symbol.as_deref()) {
                        continue;
                    }
                    let event_type = event.event_type();
                    match serde_json::to_string(&event) {
                        Ok(event_json) => {
                            debug!("SSE: Broadcasting event: {}", event_type);
                            yield Ok(Event::default().event(event_type).data(event_json));
                        }
                        Err(e) => {
                            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE client lagging, events dropped");
                }
                Err(RecvError::Closed) => {
                    info!("SSE: Event bus closed, ending stream");
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
