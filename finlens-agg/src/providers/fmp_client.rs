//! Financial Modeling Prep client
//!
//! Company profile, quote and annual statements. FMP answers every endpoint
//! with a JSON array; profile and quote are unwrapped to their first element.

use async_trait::async_trait;
use governor::DefaultDirectRateLimiter;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::{build_http_client, build_rate_limiter, check_status, require_key, HttpSettings};
use crate::types::{Endpoint, FetchError, FinancialDataProvider};

const PROVIDER: &str = "fmp";

/// Annual periods requested for statement endpoints
const STATEMENT_PERIODS: u32 = 5;

pub struct FmpClient {
    http_client: Client,
    rate_limiter: DefaultDirectRateLimiter,
    base_url: String,
    api_key: Option<String>,
}

impl FmpClient {
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

    fn path(endpoint: Endpoint) -> &'static str {
        match endpoint {
            Endpoint::Profile => "profile",
            Endpoint::Quote => "quote",
            Endpoint::IncomeStatement => "income-statement",
            Endpoint::BalanceSheet => "balance-sheet-statement",
            Endpoint::CashFlow => "cash-flow-statement",
            Endpoint::KeyMetrics => "key-metrics",
            Endpoint::Ratios => "ratios",
        }
    }
}

/// First element of a single-record endpoint; `None` when the array is empty
fn unwrap_single(body: Value) -> Result<Option<Value>, FetchError> {
    match body {
        Value::Array(items) => Ok(items.into_iter().next()),
        Value::Object(map) if map.is_empty() => Ok(None),
        Value::Object(map) if map.contains_key("Error Message") => Err(FetchError::Api {
            status: 200,
            message: map["Error Message"].to_string(),
        }),
        Value::Object(map) => Ok(Some(Value::Object(map))),
        other => Err(FetchError::Parse(format!("unexpected {} response: {}", PROVIDER, other))),
    }
}

#[async_trait]
impl FinancialDataProvider for FmpClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch(&self, symbol: &str, endpoint: Endpoint) -> Result<Option<Value>, FetchError> {
        let api_key = require_key(PROVIDER, &self.api_key)?;
        self.rate_limiter.until_ready().await;

        let url = format!("{}/{}/{}", self.base_url, Self::path(endpoint), symbol);
        let mut request = self.http_client.get(&url).query(&[("apikey", api_key)]);
        if endpoint.is_statement() {
            request = request.query(&[("period", "annual")]);
            request = request.query(&[("limit", STATEMENT_PERIODS)]);
        }

        debug!(symbol, endpoint = %endpoint, "Querying FMP");
        let response = check_status(PROVIDER, request.send().await?).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchError::Parse(format!("Failed to parse FMP response: {}", e)))?;

        if endpoint.is_statement() {
            match body {
                Value::Array(_) => Ok(Some(body)),
                other => unwrap_single(other),
            }
        } else {
            unwrap_single(body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_single_takes_first_element() {
        let body = json!([{ "symbol": "AAPL", "price": 190.1 }, { "symbol": "X" }]);
        assert_eq!(unwrap_single(body).unwrap(), Some(json!({ "symbol": "AAPL", "price": 190.1 })));
        assert_eq!(unwrap_single(json!([])).unwrap(), None);
    }

    #[test]
    fn test_error_message_object_is_api_error() {
        let body = json!({ "Error Message": "Invalid API KEY." });
        assert!(matches!(unwrap_single(body), Err(FetchError::Api { .. })));
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let client = FmpClient::new("http://localhost", None, &HttpSettings::default()).unwrap();
        let err = client.fetch("AAPL", Endpoint::Quote).await.unwrap_err();
        assert!(matches!(err, FetchError::Config(_)));
        assert!(!err.is_retryable());
    }
}
