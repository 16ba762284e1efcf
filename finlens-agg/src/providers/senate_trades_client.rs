//! Senate disclosure feed (FMP `senate-trading`)

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

const PROVIDER: &str = "senate_trades";

/// Wire format of one FMP senate disclosure
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SenateDisclosure {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    office: Option<String>,
    #[serde(default)]
    symbol: String,
    #[serde(rename = "type", default)]
    transaction_type: String,
    #[serde(default)]
    amount: String,
    transaction_date: Option<String>,
    /// FMP spells it this way
    #[serde(rename = "dateRecieved")]
    date_received: Option<String>,
    owner: Option<String>,
    link: Option<String>,
}

impl From<SenateDisclosure> for CongressionalTrade {
    fn from(d: SenateDisclosure) -> Self {
        let politician = match d.office.filter(|o| !o.trim().is_empty()) {
            Some(office) => office,
            None => format!("{} {}", d.first_name.trim(), d.last_name.trim())
                .trim()
                .to_string(),
        };

        CongressionalTrade {
            politician,
            position: "Senator".to_string(),
            symbol: d.symbol,
            transaction_type: d.transaction_type,
            amount: d.amount,
            transaction_date: parse_wire_date(d.transaction_date.as_deref()),
            disclosure_date: parse_wire_date(d.date_received.as_deref()),
            owner: d.owner,
            link: d.link,
        }
    }
}

pub struct SenateTradesClient {
    http_client: Client,
    rate_limiter: DefaultDirectRateLimiter,
    base_url: String,
    api_key: Option<String>,
}

impl SenateTradesClient {
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
impl TradeFeed for SenateTradesClient {
    fn source_id(&self) -> &'static str {
        PROVIDER
    }

    fn chamber(&self) -> Chamber {
        Chamber::Senate
    }

    async fn fetch_trades(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<Vec<CongressionalTrade>, FetchError> {
        let api_key = require_key(PROVIDER, &self.api_key)?;
        self.rate_limiter.until_ready().await;

        debug!(symbol, "Querying senate disclosures");
        let response = self
            .http_client
            .get(format!("{}/senate-trading", self.base_url))
            .query(&[("symbol", symbol), ("apikey", api_key)])
            .send()
            .await?;
        let disclosures: Vec<SenateDisclosure> = check_status(PROVIDER, response)
            .await?
            .json()
            .await
            .map_err(|e| FetchError::Parse(format!("Failed to parse senate disclosures: {}", e)))?;

        let trades = disclosures.into_iter().map(CongressionalTrade::from).collect();
        Ok(within_range(trades, range))
    }
}
