//! Settle-all fan-out combinator
//!
//! Runs a batch of independent slice fetches concurrently inside the calling
//! task (`join_all`, no spawning) and waits for every one of them to settle.
//! A failing slice never affects its siblings: it is replaced by its fallback
//! and marked `error` in the run's status tracker.

use finlens_common::SourceStatus;
use futures::future::{join_all, BoxFuture, FutureExt};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::status_tracker::StatusTracker;
use crate::types::{FetchError, FetchKey};

/// Whether a successfully fetched value carries no data
pub trait EmptyCheck {
    fn is_empty_result(&self) -> bool;
}

impl EmptyCheck for Value {
    fn is_empty_result(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            Value::String(s) => s.is_empty(),
            Value::Bool(_) | Value::Number(_) => false,
        }
    }
}

impl<T> EmptyCheck for Vec<T> {
    fn is_empty_result(&self) -> bool {
        self.is_empty()
    }
}

impl<T> EmptyCheck for Option<T> {
    fn is_empty_result(&self) -> bool {
        self.is_none()
    }
}

/// One slice to fetch: key, fallback sentinel and the fetch itself
pub struct SliceTask<'a, T> {
    pub key: FetchKey,
    pub fallback: T,
    operation: BoxFuture<'a, Result<T, FetchError>>,
}

impl<'a, T> SliceTask<'a, T> {
    pub fn new<F>(key: impl Into<FetchKey>, fallback: T, operation: F) -> Self
    where
        F: Future<Output = Result<T, FetchError>> + Send + 'a,
    {
        Self {
            key: key.into(),
            fallback,
            operation: operation.boxed(),
        }
    }
}

/// Terminal outcome of one slice
#[derive(Debug, Clone)]
pub struct Settled<T> {
    pub key: FetchKey,
    /// Fetched value, or the fallback when the fetch failed
    pub value: T,
    pub status: SourceStatus,
    pub error: Option<String>,
    /// 0-based position in which this slice settled within its batch
    pub completion_order: usize,
}

/// Run every task concurrently and collect all outcomes in task order
///
/// Each key is moved to `loading` before any fetch starts and to its terminal
/// status the moment its own fetch settles. Returns `Err(FetchError::Cancelled)`
/// if `cancel` fires before the batch settles; no tracker writes happen after
/// cancellation is observed.
pub async fn settle_all<T>(
    tasks: Vec<SliceTask<'_, T>>,
    tracker: &StatusTracker,
    cancel: &CancellationToken,
) -> Result<Vec<Settled<T>>, FetchError>
where
    T: EmptyCheck + Send,
{
    if cancel.is_cancelled() {
        return Err(FetchError::Cancelled);
    }

    for task in &tasks {
        // Rejections are already logged by the tracker
        let _ = tracker.set_status(&task.key, SourceStatus::Loading);
    }

    let completed = AtomicUsize::new(0);

    let futures = tasks.into_iter().map(|task| {
        let completed = &completed;
        async move {
            let SliceTask {
                key,
                fallback,
                operation,
            } = task;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                result = operation => result,
            };

            if cancel.is_cancelled() {
                return None;
            }

            let (value, status, error) = match result {
                Ok(value) if value.is_empty_result() => (value, SourceStatus::Empty, None),
                Ok(value) => (value, SourceStatus::Success, None),
                Err(e) => {
                    warn!(key = %key, error = %e, "Slice fetch failed, using fallback");
                    (fallback, SourceStatus::Error, Some(e.to_string()))
                }
            };

            let _ = tracker.set_status(&key, status);
            let completion_order = completed.fetch_add(1, Ordering::SeqCst);
            debug!(key = %key, status = %status, completion_order, "Slice settled");

            Some(Settled {
                key,
                value,
                status,
                error,
                completion_order,
            })
        }
    });

    let settled: Option<Vec<Settled<T>>> = join_all(futures).await.into_iter().collect();

    match settled {
        Some(settled) if !cancel.is_cancelled() => Ok(settled),
        _ => Err(FetchError::Cancelled),
    }
}
