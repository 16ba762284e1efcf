//! Event types and broadcast bus for finlens
//!
//! Events are published on a `tokio::sync::broadcast` channel and streamed to
//! dashboard clients over SSE. Publishing never blocks; slow subscribers lag
//! and drop the oldest events.

use crate::status::SourceStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// finlens event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FinlensEvent {
    /// One data slice of a fetch run changed status
    SliceStatusChanged {
        run_id: Uuid,
        symbol: String,
        key: String,
        status: SourceStatus,
        timestamp: DateTime<Utc>,
    },

    /// Aggregate fetch finished (core slices present)
    AggregateCompleted {
        run_id: Uuid,
        symbol: String,
        degraded_keys: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// Aggregate fetch failed fatally or was superseded
    AggregateFailed {
        run_id: Uuid,
        symbol: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Artifact saved (inserted or updated in place)
    ArtifactSaved {
        owner_id: String,
        kind: String,
        symbol: String,
        artifact_id: Uuid,
        evicted: u64,
        timestamp: DateTime<Utc>,
    },

    /// Artifact removed by its owner
    ArtifactDeleted {
        artifact_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl FinlensEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            FinlensEvent::SliceStatusChanged { .. } => "SliceStatusChanged",
            FinlensEvent::AggregateCompleted { .. } => "AggregateCompleted",
            FinlensEvent::AggregateFailed { .. } => "AggregateFailed",
            FinlensEvent::ArtifactSaved { .. } => "ArtifactSaved",
            FinlensEvent::ArtifactDeleted { .. } => "ArtifactDeleted",
        }
    }
}

/// Broadcast bus shared by all request handlers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FinlensEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use finlens_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<FinlensEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: FinlensEvent,
    ) -> Result<usize, broadcast::error::SendError<FinlensEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: FinlensEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
