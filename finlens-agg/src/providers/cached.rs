//! Read-through cache in front of any `FinancialDataProvider`
//!
//! Successful responses are stored in the `response_cache` table keyed by
//! provider, endpoint and symbol. Cache failures never fail the fetch.

use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::ResponseCache;
use crate::types::{Endpoint, FetchError, FinancialDataProvider};

pub struct CachedFinancialProvider {
    inner: Arc<dyn FinancialDataProvider>,
    cache: ResponseCache,
    ttl: Duration,
}

impl CachedFinancialProvider {
    pub fn new(inner: Arc<dyn FinancialDataProvider>, cache: ResponseCache, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    fn cache_key(&self, symbol: &str, endpoint: Endpoint) -> String {
        format!("{}:{}:{}", self.inner.name(), endpoint, symbol)
    }
}

#[async_trait]
impl FinancialDataProvider for CachedFinancialProvider {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn fetch(&self, symbol: &str, endpoint: Endpoint) -> Result<Option<Value>, FetchError> {
        let key = self.cache_key(symbol, endpoint);

        match self.cache.get(&key).await {
            Ok(Some(value)) => {
                debug!(key = %key, "Cache hit");
                return Ok(Some(value));
            }
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "Cache read failed, fetching upstream"),
        }

        let fetched = self.inner.fetch(symbol, endpoint).await?;

        if let Some(value) = &fetched {
            if let Err(e) = self.cache.put(&key, value, self.ttl).await {
                warn!(key = %key, error = %e, "Cache write failed");
            }
        }

        Ok(fetched)
    }
}
