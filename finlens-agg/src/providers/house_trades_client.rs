//! House disclosure feed (Quiver Quantitative `historical/housetrading`)

use async_trait::async_trait;
use governor::DefaultDirectRateLimiter;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{
    build_http_client, build_rate_limiter, check_status, parse_wire_date, require_key, within_range,
    HttpSettings,
};
use crate::types::{Chamber, CongressionalTrade, DateRange, FetchError, TradeFeed};

const PROVIDER: &str = "house_trades";

/// Wire format of one Quiver house trade
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HouseTrade {
    #[serde(default)]
    representative: String,
    #[serde(default)]
    ticker: String,
    #[serde(default)]
    transaction: String,
    /// Disclosed value bracket, e.g. "$1,001 - $15,000"
    range: Option<String>,
    /// Point estimate when no bracket is given
    amount: Option<serde_json::Value>,
    transaction_date: Option<String>,
    report_date: Option<String>,
}

impl From<HouseTrade> for CongressionalTrade {
    fn from(t: HouseTrade) -> Self {
        let amount = match (t.range, t.amount) {
            (Some(range), _) if !range.is_empty() => range,
            (_, Some(serde_json::Value::String(s))) => s,
            (_, Some(serde_json::Value::Number(n))) => format!("${}", n),
            _ => String::new(),
        };

        CongressionalTrade {
            politician: t.representative,
            position: "Representative".to_string(),
            symbol: t.ticker,
            transaction_type: t.transaction,
            amount,
            transaction_date: parse_wire_date(t.transaction_date.as_deref()),
            disclosure_date: parse_wire_date(t.report_date.as_deref()),
            owner: None,
            link: None,
        }
    }
}

pub struct HouseTradesClient {
    http_client: Client,
    rate_limiter: DefaultDirectRateLimiter,
    base_url: String,
    api_key: Option<String>,
}

impl HouseTradesClient {
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

#[async_trait]
impl TradeFeed for HouseTradesClient {
    fn source_id(&self) -> &'static str {
        PROVIDER
    }

    fn chamber(&self) -> Chamber {
        Chamber::House
    }

    async fn fetch_trades(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<Vec<CongressionalTrade>, FetchError> {
        let api_key = require_key(PROVIDER, &self.api_key)?;
        self.rate_limiter.until_ready().await;

        debug!(symbol, "Querying house disclosures");
        let response = self
            .http_client
            .get(format!("{}/historical/housetrading/{}", self.base_url, symbol))
            .bearer_auth(api_key)
            .send()
            .await?;
        let raw: Vec<HouseTrade> = check_status(PROVIDER, response)
            .await?
            .json()
            .await
            .map_err(|e| FetchError::Parse(format!("Failed to parse house disclosures: {}", e)))?;

        let trades = raw.into_iter().map(CongressionalTrade::from).collect();
        Ok(within_range(trades, range))
    }
}
