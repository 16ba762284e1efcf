//! Finnhub client: company news and news sentiment

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::DefaultDirectRateLimiter;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{build_http_client, build_rate_limiter, check_status, require_key, HttpSettings};
use crate::types::{DateRange, FetchError, NewsArticle, NewsProvider};

const PROVIDER: &str = "finnhub";

/// Most recent articles kept per request
const MAX_ARTICLES: usize = 50;

/// Wire format of one `/company-news` entry
#[derive(Debug, Deserialize)]
struct FinnhubArticle {
    #[serde(default)]
    headline: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    url: String,
    /// Unix seconds
    datetime: i64,
}

impl FinnhubArticle {
    fn into_article(self) -> Option<NewsArticle> {
        let published_at = DateTime::<Utc>::from_timestamp(self.datetime, 0)?;
        if self.headline.trim().is_empty() {
            return None;
        }
        Some(NewsArticle {
            headline: self.headline,
            summary: self.summary,
            source: self.source,
            url: self.url,
            published_at,
        })
    }
}

pub struct FinnhubClient {
    http_client: Client,
    rate_limiter: DefaultDirectRateLimiter,
    base_url: String,
    api_key: Option<String>,
}

impl FinnhubClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        settings: &HttpSettings,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            http_client: build_http_client(settings)?,
            rate_limiter: build_rate_limiter(settings),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

/// Newest first, truncated to `MAX_ARTICLES`
fn normalize_articles(raw: Vec<FinnhubArticle>) -> Vec<NewsArticle> {
    let mut articles: Vec<NewsArticle> = raw
        .into_iter()
        .filter_map(FinnhubArticle::into_article)
        .collect();
    articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    articles.truncate(MAX_ARTICLES);
    articles
}

#[async_trait]
impl NewsProvider for FinnhubClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_news(&self, symbol: &str, range: DateRange) -> Result<Vec<NewsArticle>, FetchError> {
        let api_key = require_key(PROVIDER, &self.api_key)?;
        self.rate_limiter.until_ready().await;

        let from = range.from.format("%Y-%m-%d").to_string();
        let to = range.to.format("%Y-%m-%d").to_string();
        debug!(symbol, from = %from, to = %to, "Querying Finnhub company news");

        let response = self
            .http_client
            .get(format!("{}/company-news", self.base_url))
            .query(&[("symbol", symbol), ("from", from.as_str()), ("to", to.as_str()), ("token", api_key)])
            .send()
            .await?;
        let raw: Vec<FinnhubArticle> = check_status(PROVIDER, response)
            .await?
            .json()
            .await
            .map_err(|e| FetchError::Parse(format!("Failed to parse Finnhub news: {}", e)))?;

        Ok(normalize_articles(raw))
    }

    /// Finnhub scores sentiment over its own trailing window; `range` is not sent
    async fn fetch_sentiment(&self, symbol: &str, _range: DateRange) -> Result<Option<Value>, FetchError> {
        let api_key = require_key(PROVIDER, &self.api_key)?;
        self.rate_limiter.until_ready().await;

        debug!(symbol, "Querying Finnhub news sentiment");
        let response = self
            .http_client
            .get(format!("{}/news-sentiment", self.base_url))
            .query(&[("symbol", symbol), ("token", api_key)])
            .send()
            .await?;
        let body: Value = check_status(PROVIDER, response)
            .await?
            .json()
            .await
            .map_err(|e| FetchError::Parse(format!("Failed to parse Finnhub sentiment: {}", e)))?;

        Ok(body.get("sentiment").is_some().then_some(body))
    }
}
