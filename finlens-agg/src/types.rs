//! Core types and provider trait definitions for finlens-agg
//!
//! Every upstream collaborator sits behind a trait so the orchestration,
//! merge and generation layers can be exercised with in-process fakes:
//! - `FinancialDataProvider`: company profile, quote and statements
//! - `NewsProvider`: company news and sentiment
//! - `TradeFeed`: one congressional-trading disclosure feed
//! - `CompletionService`: one generative completion call

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Fetch keys and ranges
// ============================================================================

/// Name of one logical data slice within a fetch run ("profile", "news", ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FetchKey(String);

impl FetchKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FetchKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for FetchKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inclusive calendar date window for news and disclosure queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// Window ending today (UTC) and spanning `days` days back
    pub fn last_days(days: i64) -> Self {
        let to = Utc::now().date_naive();
        Self {
            from: to - Duration::days(days.max(0)),
            to,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }
}

/// Normalize and validate a ticker symbol
///
/// Accepts 1-10 characters of ASCII letters, digits, `.` or `-`; returns the
/// upper-cased symbol.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let symbol = raw.trim().to_ascii_uppercase();
    let valid_len = (1..=10).contains(&symbol.len());
    let valid_chars = symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    (valid_len && valid_chars).then_some(symbol)
}

// ============================================================================
// Upstream errors
// ============================================================================

/// Failure of a single upstream call
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream answered with a non-success status
    #[error("Upstream API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Upstream throttled the request
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Resource does not exist upstream
    #[error("Not available: {0}")]
    NotAvailable(String),

    /// Response body did not match the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Client is missing required configuration (e.g. API key)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Run was superseded or the caller went away
    #[error("Cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether repeating the same call could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::RateLimited(_) => true,
            FetchError::Api { status, .. } => *status >= 500,
            FetchError::NotAvailable(_)
            | FetchError::Parse(_)
            | FetchError::Config(_)
            | FetchError::Cancelled => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

// ============================================================================
// Financial data
// ============================================================================

/// Financial-data endpoint kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Profile,
    Quote,
    IncomeStatement,
    BalanceSheet,
    CashFlow,
    KeyMetrics,
    Ratios,
}

impl Endpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Endpoint::Profile => "profile",
            Endpoint::Quote => "quote",
            Endpoint::IncomeStatement => "income_statement",
            Endpoint::BalanceSheet => "balance_sheet",
            Endpoint::CashFlow => "cash_flow",
            Endpoint::KeyMetrics => "key_metrics",
            Endpoint::Ratios => "ratios",
        }
    }

    /// Period-keyed statement endpoints (arrays of yearly rows)
    pub fn is_statement(self) -> bool {
        !matches!(self, Endpoint::Profile | Endpoint::Quote)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Company fundamentals source
///
/// `Ok(None)` means the provider answered but has nothing for this symbol.
#[async_trait::async_trait]
pub trait FinancialDataProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(
        &self,
        symbol: &str,
        endpoint: Endpoint,
    ) -> Result<Option<serde_json::Value>, FetchError>;
}

// ============================================================================
// News
// ============================================================================

/// One news article about a company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub headline: String,
    pub summary: String,
    pub source: String,
    pub url: String,
    pub published_at: chrono::DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait NewsProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_news(&self, symbol: &str, range: DateRange)
        -> Result<Vec<NewsArticle>, FetchError>;

    async fn fetch_sentiment(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<Option<serde_json::Value>, FetchError>;
}

// ============================================================================
// Congressional trades
// ============================================================================

/// Legislative chamber of a disclosure feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chamber {
    Senate,
    House,
}

impl Chamber {
    pub fn label(self) -> &'static str {
        match self {
            Chamber::Senate => "Senate",
            Chamber::House => "House",
        }
    }
}

/// One congressional trade disclosure, normalized from a provider's wire schema
///
/// Carries no provider tag: tagging happens only when feeds are merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CongressionalTrade {
    pub politician: String,
    /// Office held, e.g. "Senator" or "Representative"
    pub position: String,
    pub symbol: String,
    pub transaction_type: String,
    pub amount: String,
    pub transaction_date: Option<NaiveDate>,
    pub disclosure_date: Option<NaiveDate>,
    pub owner: Option<String>,
    pub link: Option<String>,
}

/// One congressional-trading disclosure provider
#[async_trait::async_trait]
pub trait TradeFeed: Send + Sync {
    /// Provider identifier used as the merged record's `source`
    fn source_id(&self) -> &'static str;

    fn chamber(&self) -> Chamber;

    async fn fetch_trades(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<Vec<CongressionalTrade>, FetchError>;
}

// ============================================================================
// Generative completion
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Reasoning effort for models that accept it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

/// Sampling hint: reasoning models take an effort, others a temperature
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GenerationHint {
    Temperature(f32),
    Effort(ReasoningEffort),
}

/// One completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub hint: GenerationHint,
    /// Attempt budget for the resilient call wrapper
    pub max_attempts: u32,
}

/// Single (un-retried) completion call returning free text
#[async_trait::async_trait]
pub trait CompletionService: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol(" aapl "), Some("AAPL".to_string()));
        assert_eq!(normalize_symbol("brk.b"), Some("BRK.B".to_string()));
        assert_eq!(normalize_symbol(""), None);
        assert_eq!(normalize_symbol("ABCDEFGHIJK"), None);
        assert_eq!(normalize_symbol("AA PL"), None);
        assert_eq!(normalize_symbol("../etc"), None);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(FetchError::Network("reset".into()).is_retryable());
        assert!(FetchError::RateLimited("429".into()).is_retryable());
        assert!(FetchError::Api { status: 503, message: String::new() }.is_retryable());
        assert!(!FetchError::Api { status: 400, message: String::new() }.is_retryable());
        assert!(!FetchError::NotAvailable("404".into()).is_retryable());
        assert!(!FetchError::Cancelled.is_retryable());
    }

    #[test]
    fn test_date_range_contains_bounds() {
        let range = DateRange::last_days(30);
        assert!(range.contains(range.from));
        assert!(range.contains(range.to));
        assert!(!range.contains(range.from - Duration::days(1)));
    }

    #[test]
    fn test_fetch_key_serializes_as_plain_string() {
        let key = FetchKey::from("income");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"income\"");
        assert_eq!(key.to_string(), "income");
    }
}
