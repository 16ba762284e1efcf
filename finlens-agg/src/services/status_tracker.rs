//! Per-Key Status Tracker
//!
//! Tracks the lifecycle of every data slice in one fetch run. Each run owns
//! its own tracker; trackers are never shared between runs, so two runs for
//! different symbols cannot overwrite each other's statuses.
//!
//! Transitions are validated against `SourceStatus::can_transition_to` and
//! published on a `tokio::sync::watch` channel as they happen, so observers
//! see `loading` before the terminal state rather than only the final map.

use chrono::Utc;
use finlens_common::events::{EventBus, FinlensEvent};
use finlens_common::SourceStatus;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::FetchKey;

/// Status of every key in a run
pub type StatusMap = BTreeMap<FetchKey, SourceStatus>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusError {
    #[error("unknown fetch key '{0}'")]
    UnknownKey(FetchKey),

    #[error("illegal status transition for '{key}': {from} -> {to}")]
    IllegalTransition {
        key: FetchKey,
        from: SourceStatus,
        to: SourceStatus,
    },
}

/// Status tracker for one fetch run
pub struct StatusTracker {
    run_id: Uuid,
    symbol: String,
    tx: watch::Sender<StatusMap>,
    events: Option<EventBus>,
}

impl StatusTracker {
    /// New tracker with every key `Pending`
    pub fn new(symbol: impl Into<String>, keys: impl IntoIterator<Item = FetchKey>) -> Self {
        let statuses: StatusMap = keys
            .into_iter()
            .map(|key| (key, SourceStatus::Pending))
            .collect();
        let (tx, _) = watch::channel(statuses);

        Self {
            run_id: Uuid::new_v4(),
            symbol: symbol.into(),
            tx,
            events: None,
        }
    }

    /// Also publish every transition on the process event bus
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Move `key` to `status`, rejecting backward, skipping or post-terminal moves
    pub fn set_status(&self, key: &FetchKey, status: SourceStatus) -> Result<(), StatusError> {
        let mut outcome = Ok(());

        self.tx.send_if_modified(|map| match map.get_mut(key) {
            None => {
                outcome = Err(StatusError::UnknownKey(key.clone()));
                false
            }
            Some(current) if !current.can_transition_to(status) => {
                outcome = Err(StatusError::IllegalTransition {
                    key: key.clone(),
                    from: *current,
                    to: status,
                });
                false
            }
            Some(current) => {
                *current = status;
                true
            }
        });

        match &outcome {
            Ok(()) => {
                debug!(
                    run_id = %self.run_id,
                    symbol = %self.symbol,
                    key = %key,
                    status = %status,
                    "Slice status changed"
                );
                if let Some(events) = &self.events {
                    events.emit_lossy(FinlensEvent::SliceStatusChanged {
                        run_id: self.run_id,
                        symbol: self.symbol.clone(),
                        key: key.to_string(),
                        status,
                        timestamp: Utc::now(),
                    });
                }
            }
            Err(e) => warn!(run_id = %self.run_id, error = %e, "Rejected status update"),
        }

        outcome
    }

    pub fn status(&self, key: &FetchKey) -> Option<SourceStatus> {
        self.tx.borrow().get(key).copied()
    }

    /// Copy of the full status map at this instant
    pub fn snapshot(&self) -> StatusMap {
        self.tx.borrow().clone()
    }

    /// Receiver that observes every published status map
    pub fn subscribe(&self) -> watch::Receiver<StatusMap> {
        self.tx.subscribe()
    }

    pub fn all_terminal(&self) -> bool {
        self.tx.borrow().values().all(|s| s.is_terminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> FetchKey {
        FetchKey::from(name)
    }

    #[test]
    fn test_new_tracker_starts_pending() {
        let tracker = StatusTracker::new("AAPL", [key("profile"), key("news")]);
        assert_eq!(tracker.status(&key("profile")), Some(SourceStatus::Pending));
        assert_eq!(tracker.snapshot().len(), 2);
        assert!(!tracker.all_terminal());
    }

    #[test]
    fn test_forward_lifecycle() {
        let tracker = StatusTracker::new("AAPL", [key("news")]);
        tracker.set_status(&key("news"), SourceStatus::Loading).unwrap();
        tracker.set_status(&key("news"), SourceStatus::Empty).unwrap();
        assert_eq!(tracker.status(&key("news")), Some(SourceStatus::Empty));
        assert!(tracker.all_terminal());
    }

    #[test]
    fn test_terminal_state_is_never_reset() {
        let tracker = StatusTracker::new("AAPL", [key("news")]);
        tracker.set_status(&key("news"), SourceStatus::Loading).unwrap();
        tracker.set_status(&key("news"), SourceStatus::Error).unwrap();

        let err = tracker
            .set_status(&key("news"), SourceStatus::Loading)
            .unwrap_err();
        assert_eq!(
            err,
            StatusError::IllegalTransition {
                key: key("news"),
                from: SourceStatus::Error,
                to: SourceStatus::Loading,
            }
        );
        assert!(tracker.set_status(&key("news"), SourceStatus::Success).is_err());
        assert_eq!(tracker.status(&key("news")), Some(SourceStatus::Error));
    }

    #[test]
    fn test_cannot_skip_loading() {
        let tracker = StatusTracker::new("AAPL", [key("quote")]);
        assert!(tracker.set_status(&key("quote"), SourceStatus::Success).is_err());
        assert_eq!(tracker.status(&key("quote")), Some(SourceStatus::Pending));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let tracker = StatusTracker::new("AAPL", [key("quote")]);
        assert_eq!(
            tracker.set_status(&key("ratios"), SourceStatus::Loading),
            Err(StatusError::UnknownKey(key("ratios")))
        );
    }

    #[tokio::test]
    async fn test_observer_sees_loading_before_terminal() {
        let tracker = StatusTracker::new("AAPL", [key("income")]);
        let mut rx = tracker.subscribe();

        tracker.set_status(&key("income"), SourceStatus::Loading).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update()[&key("income")], SourceStatus::Loading);

        tracker.set_status(&key("income"), SourceStatus::Success).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update()[&key("income")], SourceStatus::Success);
    }

    #[tokio::test]
    async fn test_transitions_published_on_event_bus() {
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let tracker = StatusTracker::new("MSFT", [key("news")]).with_events(bus);

        tracker.set_status(&key("news"), SourceStatus::Loading).unwrap();

        match events.recv().await.unwrap() {
            FinlensEvent::SliceStatusChanged { symbol, key, status, run_id, .. } => {
                assert_eq!(symbol, "MSFT");
                assert_eq!(key, "news");
                assert_eq!(status, SourceStatus::Loading);
                assert_eq!(run_id, tracker.run_id());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_independent_trackers_do_not_share_state() {
        let a = StatusTracker::new("AAPL", [key("news")]);
        let b = StatusTracker::new("MSFT", [key("news")]);
        a.set_status(&key("news"), SourceStatus::Loading).unwrap();
        assert_eq!(b.status(&key("news")), Some(SourceStatus::Pending));
        assert_ne!(a.run_id(), b.run_id());
    }
}
