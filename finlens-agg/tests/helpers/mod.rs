//! Shared test fakes for finlens-agg integration tests
//!
//! Every fake counts its calls so tests can assert which upstreams were hit.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use finlens_agg::services::{Providers, RetryPolicy};
use finlens_agg::types::{
    Chamber, CompletionRequest, CompletionService, CongressionalTrade, DateRange, Endpoint,
    FetchError, FinancialDataProvider, GenerationHint, NewsArticle, NewsProvider, TradeFeed,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fast policy so retry tests don't sleep for seconds
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1))
}

// ============================================================================
// Financial data
// ============================================================================

#[derive(Default)]
pub struct FakeFinancial {
    failures: HashMap<Endpoint, FetchError>,
    empty: Vec<Endpoint>,
    delay: Option<Duration>,
    calls: Mutex<Vec<Endpoint>>,
}

impl FakeFinancial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, endpoint: Endpoint, error: FetchError) -> Self {
        self.failures.insert(endpoint, error);
        self
    }

    pub fn empty(mut self, endpoint: Endpoint) -> Self {
        self.empty.push(endpoint);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Endpoint> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, endpoint: Endpoint) -> usize {
        self.calls().into_iter().filter(|e| *e == endpoint).count()
    }
}

#[async_trait]
impl FinancialDataProvider for FakeFinancial {
    fn name(&self) -> &'static str {
        "fake_financial"
    }

    async fn fetch(&self, symbol: &str, endpoint: Endpoint) -> Result<Option<Value>, FetchError> {
        self.calls.lock().unwrap().push(endpoint);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.failures.get(&endpoint) {
            return Err(err.clone());
        }
        if self.empty.contains(&endpoint) {
            return Ok(None);
        }

        let value = match endpoint {
            Endpoint::Profile => json!({"symbol": symbol, "companyName": "Acme Corp"}),
            Endpoint::Quote => json!({"symbol": symbol, "price": 101.5}),
            other => json!([{"period": "FY2024", "kind": other.as_str()}]),
        };
        Ok(Some(value))
    }
}

// ============================================================================
// News
// ============================================================================

#[derive(Default)]
pub struct FakeNews {
    pub fail_news: bool,
    pub news_calls: AtomicUsize,
    pub sentiment_calls: AtomicUsize,
}

impl FakeNews {
    pub fn calls(&self) -> usize {
        self.news_calls.load(Ordering::SeqCst) + self.sentiment_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NewsProvider for FakeNews {
    fn name(&self) -> &'static str {
        "fake_news"
    }

    async fn fetch_news(&self, symbol: &str, range: DateRange) -> Result<Vec<NewsArticle>, FetchError> {
        self.news_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_news {
            return Err(FetchError::Api {
                status: 400,
                message: "bad request".into(),
            });
        }
        Ok(vec![NewsArticle {
            headline: format!("{} beats estimates", symbol),
            summary: "Quarterly results".into(),
            source: "Wire".into(),
            url: "https://news.example/1".into(),
            published_at: range.to.and_hms_opt(12, 0, 0).unwrap().and_utc(),
        }])
    }

    async fn fetch_sentiment(&self, _symbol: &str, _range: DateRange) -> Result<Option<Value>, FetchError> {
        self.sentiment_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(json!({"score": 0.4})))
    }
}

// ============================================================================
// Congressional trades
// ============================================================================

pub struct FakeFeed {
    source_id: &'static str,
    chamber: Chamber,
    result: Result<Vec<CongressionalTrade>, FetchError>,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeFeed {
    pub fn new(
        source_id: &'static str,
        chamber: Chamber,
        result: Result<Vec<CongressionalTrade>, FetchError>,
    ) -> Self {
        Self {
            source_id,
            chamber,
            result,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl TradeFeed for FakeFeed {
    fn source_id(&self) -> &'static str {
        self.source_id
    }

    fn chamber(&self) -> Chamber {
        self.chamber
    }

    async fn fetch_trades(&self, _symbol: &str, _range: DateRange) -> Result<Vec<CongressionalTrade>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }
}

pub fn trade(politician: &str, position: &str, date: Option<(i32, u32, u32)>) -> CongressionalTrade {
    CongressionalTrade {
        politician: politician.to_string(),
        position: position.to_string(),
        symbol: "AAPL".to_string(),
        transaction_type: "Purchase".to_string(),
        amount: "$1,001 - $15,000".to_string(),
        transaction_date: date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
        disclosure_date: None,
        owner: None,
        link: None,
    }
}

// ============================================================================
// Completion
// ============================================================================

/// Replays scripted replies in order; the last reply repeats
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String, FetchError>>>,
    pub calls: AtomicUsize,
    pub hints: Mutex<Vec<GenerationHint>>,
}

impl ScriptedCompletion {
    pub fn new(replies: Vec<Result<String, FetchError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            hints: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn hints(&self) -> Vec<GenerationHint> {
        self.hints.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.hints.lock().unwrap().push(request.hint);
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies
                .front()
                .cloned()
                .unwrap_or_else(|| Err(FetchError::Config("no scripted reply".into())))
        }
    }
}

// ============================================================================
// Assembly
// ============================================================================

pub struct Fakes {
    pub financial: Arc<FakeFinancial>,
    pub news: Arc<FakeNews>,
    pub feeds: Vec<Arc<FakeFeed>>,
    pub completion: Arc<ScriptedCompletion>,
}

impl Fakes {
    pub fn new(financial: FakeFinancial) -> Self {
        Self {
            financial: Arc::new(financial),
            news: Arc::new(FakeNews::default()),
            feeds: Vec::new(),
            completion: Arc::new(ScriptedCompletion::replying("{}")),
        }
    }

    pub fn with_news(mut self, news: FakeNews) -> Self {
        self.news = Arc::new(news);
        self
    }

    pub fn with_feed(mut self, feed: FakeFeed) -> Self {
        self.feeds.push(Arc::new(feed));
        self
    }

    pub fn with_completion(mut self, completion: ScriptedCompletion) -> Self {
        self.completion = Arc::new(completion);
        self
    }

    pub fn providers(&self) -> Providers {
        Providers {
            financial: self.financial.clone(),
            news: self.news.clone(),
            trade_feeds: self
                .feeds
                .iter()
                .map(|f| f.clone() as Arc<dyn TradeFeed>)
                .collect(),
            completion: self.completion.clone(),
        }
    }
}

/// File-backed pool in a fresh temp dir (dir must outlive the pool)
pub async fn test_pool() -> (tempfile::TempDir, sqlx::SqlitePool) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let pool = finlens_agg::db::init_database_pool(&dir.path().join("finlens.db"))
        .await
        .expect("Failed to open test database");
    (dir, pool)
}
