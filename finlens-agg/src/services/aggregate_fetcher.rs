//! Two-phase aggregate fetch orchestrator
//!
//! **Phase 1 (core):** `profile` and `quote` are fetched concurrently and
//! awaited. If either is not `success` the run fails with a fatal error and
//! phase 2 is never started.
//!
//! **Phase 2 (best effort):** statements, key metrics, ratios, news and
//! sentiment are fetched concurrently. Failures degrade to fallbacks and are
//! reported through the status map.
//!
//! Each run owns its own `StatusTracker`; every upstream call goes through the
//! resilient call wrapper with the run's cancellation token.

use chrono::Utc;
use finlens_common::events::{EventBus, FinlensEvent};
use finlens_common::SourceStatus;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::fan_out::{settle_all, SliceTask};
use super::merge::{merge_sources, MergedCollection, SourceContribution, SourceOutcome};
use super::resilient_call::{call_with_retry_if, RetryPolicy};
use super::status_tracker::{StatusMap, StatusTracker};
use crate::types::{
    CompletionService, CongressionalTrade, DateRange, Endpoint, FetchError, FetchKey,
    FinancialDataProvider, NewsProvider, TradeFeed,
};

pub const KEY_PROFILE: &str = "profile";
pub const KEY_QUOTE: &str = "quote";
pub const KEY_INCOME: &str = "income";
pub const KEY_BALANCE_SHEET: &str = "balance_sheet";
pub const KEY_CASH_FLOW: &str = "cash_flow";
pub const KEY_KEY_METRICS: &str = "key_metrics";
pub const KEY_RATIOS: &str = "ratios";
pub const KEY_NEWS: &str = "news";
pub const KEY_SENTIMENT: &str = "sentiment";

/// Slices without which the dashboard cannot render
pub const CORE_KEYS: [&str; 2] = [KEY_PROFILE, KEY_QUOTE];

/// Slices that degrade to fallbacks on failure
pub const BEST_EFFORT_KEYS: [&str; 7] = [
    KEY_INCOME,
    KEY_BALANCE_SHEET,
    KEY_CASH_FLOW,
    KEY_KEY_METRICS,
    KEY_RATIOS,
    KEY_NEWS,
    KEY_SENTIMENT,
];

/// News and sentiment look-back window
pub const NEWS_WINDOW_DAYS: i64 = 7;

/// Congressional disclosure look-back window
pub const TRADES_WINDOW_DAYS: i64 = 365;

/// Fallback sentinel for a key
///
/// `null` for single objects, `[]` for period lists and news, `{}` for sentiment.
pub fn fallback_for(key: &str) -> Value {
    match key {
        KEY_PROFILE | KEY_QUOTE => Value::Null,
        KEY_SENTIMENT => json!({}),
        _ => json!([]),
    }
}

fn statement_endpoint(key: &str) -> Option<Endpoint> {
    match key {
        KEY_INCOME => Some(Endpoint::IncomeStatement),
        KEY_BALANCE_SHEET => Some(Endpoint::BalanceSheet),
        KEY_CASH_FLOW => Some(Endpoint::CashFlow),
        KEY_KEY_METRICS => Some(Endpoint::KeyMetrics),
        KEY_RATIOS => Some(Endpoint::Ratios),
        _ => None,
    }
}

#[derive(Debug, Clone, Error)]
pub enum AggregateError {
    /// A core slice could not be obtained; the run is unusable
    #[error("Core data '{key}' unavailable for {symbol}: {reason}")]
    CoreSliceUnavailable {
        symbol: String,
        key: FetchKey,
        reason: String,
    },

    /// A newer run for the same client and symbol replaced this one
    #[error("Fetch for {symbol} was superseded")]
    Superseded { symbol: String },
}

/// Upstream collaborators shared by every run
#[derive(Clone)]
pub struct Providers {
    pub financial: Arc<dyn FinancialDataProvider>,
    pub news: Arc<dyn NewsProvider>,
    pub trade_feeds: Vec<Arc<dyn TradeFeed>>,
    pub completion: Arc<dyn CompletionService>,
}

/// Aggregate of one completed run
///
/// `values` and `statuses` always have identical key sets.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateResult {
    pub symbol: String,
    pub run_id: Uuid,
    pub values: BTreeMap<FetchKey, Value>,
    pub statuses: StatusMap,
}

impl AggregateResult {
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(&FetchKey::from(key))
    }

    pub fn status(&self, key: &str) -> Option<SourceStatus> {
        self.statuses.get(&FetchKey::from(key)).copied()
    }

    /// Keys that ended in `error` or `empty`
    pub fn degraded_keys(&self) -> Vec<String> {
        self.statuses
            .iter()
            .filter(|(_, s)| matches!(s, SourceStatus::Error | SourceStatus::Empty))
            .map(|(k, _)| k.to_string())
            .collect()
    }
}

/// Merged congressional trades for one symbol
#[derive(Debug, Clone, Serialize)]
pub struct AlternativeData {
    pub symbol: String,
    pub run_id: Uuid,
    pub congressional_trades: MergedCollection<CongressionalTrade>,
    pub statuses: StatusMap,
}

/// State of one aggregate run, created with every key `pending`
pub struct AggregateRun {
    symbol: String,
    tracker: StatusTracker,
    values: BTreeMap<FetchKey, Value>,
}

impl AggregateRun {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn run_id(&self) -> Uuid {
        self.tracker.run_id()
    }

    pub fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    /// Current values alongside the tracker's status map
    pub fn snapshot(&self) -> AggregateResult {
        AggregateResult {
            symbol: self.symbol.clone(),
            run_id: self.tracker.run_id(),
            values: self.values.clone(),
            statuses: self.tracker.snapshot(),
        }
    }
}

pub struct AggregateFetcher {
    providers: Providers,
    retry: RetryPolicy,
    events: Option<EventBus>,
}

impl AggregateFetcher {
    pub fn new(providers: Providers, retry: RetryPolicy) -> Self {
        Self {
            providers,
            retry,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Register every key as `pending` with its fallback value
    pub fn plan(&self, symbol: &str) -> AggregateRun {
        let keys = CORE_KEYS.into_iter().chain(BEST_EFFORT_KEYS);
        let mut tracker = StatusTracker::new(symbol, keys.clone().map(FetchKey::from));
        if let Some(events) = &self.events {
            tracker = tracker.with_events(events.clone());
        }

        let values = keys.map(|k| (FetchKey::from(k), fallback_for(k))).collect();

        AggregateRun {
            symbol: symbol.to_string(),
            tracker,
            values,
        }
    }

    /// Plan and run an aggregate fetch for `symbol`
    pub async fn fetch_aggregate(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<AggregateResult, AggregateError> {
        let run = self.plan(symbol);
        self.run(run, cancel).await
    }

    /// Execute a planned run: core batch, then best-effort batch
    pub async fn run(
        &self,
        mut run: AggregateRun,
        cancel: &CancellationToken,
    ) -> Result<AggregateResult, AggregateError> {
        let symbol = run.symbol.clone();
        info!(symbol = %symbol, run_id = %run.run_id(), "Starting aggregate fetch");

        // Phase 1: core
        let core_tasks = CORE_KEYS
            .into_iter()
            .map(|key| self.slice_task(&symbol, key, cancel))
            .collect();
        let core = settle_all(core_tasks, &run.tracker, cancel)
            .await
            .map_err(|_| self.superseded(&run))?;

        let mut core_failure = None;
        for settled in core {
            if settled.status != SourceStatus::Success && core_failure.is_none() {
                let reason = settled
                    .error
                    .clone()
                    .unwrap_or_else(|| "no data returned".to_string());
                core_failure = Some((settled.key.clone(), reason));
            }
            run.values.insert(settled.key, settled.value);
        }

        if let Some((key, reason)) = core_failure {
            error!(symbol = %symbol, key = %key, reason = %reason, "Core slice unavailable, aborting run");
            let err = AggregateError::CoreSliceUnavailable {
                symbol: symbol.clone(),
                key,
                reason,
            };
            self.emit_failed(&run, &err);
            return Err(err);
        }

        // Phase 2: best effort
        let best_effort_tasks = BEST_EFFORT_KEYS
            .into_iter()
            .map(|key| self.slice_task(&symbol, key, cancel))
            .collect();
        let best_effort = settle_all(best_effort_tasks, &run.tracker, cancel)
            .await
            .map_err(|_| self.superseded(&run))?;

        for settled in best_effort {
            run.values.insert(settled.key, settled.value);
        }

        let result = run.snapshot();
        let degraded_keys = result.degraded_keys();
        if degraded_keys.is_empty() {
            info!(symbol = %symbol, run_id = %result.run_id, "Aggregate fetch complete");
        } else {
            warn!(symbol = %symbol, run_id = %result.run_id, degraded = ?degraded_keys, "Aggregate fetch complete with degraded slices");
        }

        if let Some(events) = &self.events {
            events.emit_lossy(FinlensEvent::AggregateCompleted {
                run_id: result.run_id,
                symbol: symbol.clone(),
                degraded_keys,
                timestamp: Utc::now(),
            });
        }

        Ok(result)
    }

    /// Fetch and merge congressional trades from every configured feed
    pub async fn fetch_alternative_data(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<AlternativeData, AggregateError> {
        let feeds = &self.providers.trade_feeds;
        let mut tracker = StatusTracker::new(symbol, feeds.iter().map(|f| FetchKey::from(f.source_id())));
        if let Some(events) = &self.events {
            tracker = tracker.with_events(events.clone());
        }

        let range = DateRange::last_days(TRADES_WINDOW_DAYS);
        let tasks = feeds
            .iter()
            .map(|feed| {
                let feed = feed.clone();
                let symbol = symbol.to_string();
                let policy = self.retry;
                let cancel = cancel.clone();
                SliceTask::new(feed.source_id(), Vec::new(), async move {
                    call_with_retry_if(
                        feed.source_id(),
                        &policy,
                        &cancel,
                        || feed.fetch_trades(&symbol, range),
                        FetchError::is_retryable,
                    )
                    .await
                    .map_err(FetchError::from)
                })
            })
            .collect();

        let mut settled = settle_all(tasks, &tracker, cancel)
            .await
            .map_err(|_| AggregateError::Superseded {
                symbol: symbol.to_string(),
            })?;

        settled.sort_by_key(|s| s.completion_order);

        let contributions = settled
            .into_iter()
            .map(|s| {
                let qualifier = feeds
                    .iter()
                    .find(|f| f.source_id() == s.key.as_str())
                    .map(|f| f.chamber().label().to_string());
                let outcome = match s.status {
                    SourceStatus::Error => {
                        SourceOutcome::Failed(s.error.unwrap_or_else(|| "unknown error".to_string()))
                    }
                    _ => SourceOutcome::Records(s.value),
                };
                SourceContribution {
                    source: s.key.to_string(),
                    qualifier,
                    outcome,
                }
            })
            .collect();

        let congressional_trades = merge_sources(contributions);
        info!(
            symbol = %symbol,
            records = congressional_trades.records.len(),
            status = %congressional_trades.status,
            "Alternative data merged"
        );

        Ok(AlternativeData {
            symbol: symbol.to_string(),
            run_id: tracker.run_id(),
            congressional_trades,
            statuses: tracker.snapshot(),
        })
    }

    fn slice_task<'a>(
        &'a self,
        symbol: &str,
        key: &'static str,
        cancel: &'a CancellationToken,
    ) -> SliceTask<'a, Value> {
        let symbol = symbol.to_string();
        let fallback = fallback_for(key);
        let policy = self.retry;

        SliceTask::new(key, fallback, async move {
            let financial = &self.providers.financial;
            let news = &self.providers.news;
            let range = DateRange::last_days(NEWS_WINDOW_DAYS);

            match key {
                KEY_PROFILE => {
                    retried(key, &policy, cancel, || financial.fetch(&symbol, Endpoint::Profile))
                        .await
                        .map(Option::unwrap_or_default)
                }
                KEY_QUOTE => {
                    retried(key, &policy, cancel, || financial.fetch(&symbol, Endpoint::Quote))
                        .await
                        .map(Option::unwrap_or_default)
                }
                KEY_NEWS => retried(key, &policy, cancel, || news.fetch_news(&symbol, range))
                    .await
                    .and_then(|articles| {
                        serde_json::to_value(articles).map_err(|e| FetchError::Parse(e.to_string()))
                    }),
                KEY_SENTIMENT => {
                    retried(key, &policy, cancel, || news.fetch_sentiment(&symbol, range))
                        .await
                        .map(|v| v.unwrap_or_else(|| json!({})))
                }
                other => match statement_endpoint(other) {
                    Some(endpoint) => {
                        retried(key, &policy, cancel, || financial.fetch(&symbol, endpoint))
                            .await
                            .map(|v| v.unwrap_or_else(|| json!([])))
                    }
                    None => Err(FetchError::Config(format!("no source for key '{other}'"))),
                },
            }
        })
    }

    fn superseded(&self, run: &AggregateRun) -> AggregateError {
        let err = AggregateError::Superseded {
            symbol: run.symbol.clone(),
        };
        info!(symbol = %run.symbol, run_id = %run.run_id(), "Aggregate fetch superseded");
        self.emit_failed(run, &err);
        err
    }

    fn emit_failed(&self, run: &AggregateRun, err: &AggregateError) {
        if let Some(events) = &self.events {
            events.emit_lossy(FinlensEvent::AggregateFailed {
                run_id: run.run_id(),
                symbol: run.symbol.clone(),
                reason: err.to_string(),
                timestamp: Utc::now(),
            });
        }
    }
}

async fn retried<T, F, Fut>(
    key: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, FetchError>>,
{
    call_with_retry_if(key, policy, cancel, operation, FetchError::is_retryable)
        .await
        .map_err(FetchError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallbacks_by_key_kind() {
        assert_eq!(fallback_for(KEY_PROFILE), Value::Null);
        assert_eq!(fallback_for(KEY_INCOME), json!([]));
        assert_eq!(fallback_for(KEY_NEWS), json!([]));
        assert_eq!(fallback_for(KEY_SENTIMENT), json!({}));
    }

    #[test]
    fn test_core_and_best_effort_are_disjoint() {
        for key in CORE_KEYS {
            assert!(!BEST_EFFORT_KEYS.contains(&key));
        }
        for key in BEST_EFFORT_KEYS.iter().take(5) {
            assert!(statement_endpoint(key).is_some());
        }
    }
}
