//! Upstream HTTP clients
//!
//! Every client owns a reqwest `Client` and a `governor` rate limiter that is
//! awaited before each request. Status codes are mapped onto `FetchError` in
//! one place so retry classification is uniform across providers.

pub mod cached;
pub mod completion_client;
pub mod finnhub_client;
pub mod fmp_client;
pub mod house_trades_client;
pub mod senate_trades_client;

pub use cached::CachedFinancialProvider;
pub use completion_client::CompletionClient;
pub use finnhub_client::FinnhubClient;
pub use fmp_client::FmpClient;
pub use house_trades_client::HouseTradesClient;
pub use senate_trades_client::SenateTradesClient;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{header, Client, Response};
use std::num::NonZeroU32;
use std::time::Duration;

use crate::types::FetchError;

const USER_AGENT: &str = concat!("finlens-agg/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP settings for every provider client
#[derive(Debug, Clone, Copy)]
pub struct HttpSettings {
    pub requests_per_second: u32,
    pub timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            requests_per_second: 5,
            timeout: Duration::from_secs(15),
        }
    }
}

pub(crate) fn build_http_client(settings: &HttpSettings) -> Result<Client, FetchError> {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));

    Client::builder()
        .timeout(settings.timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| FetchError::Config(format!("Failed to create HTTP client: {}", e)))
}

pub(crate) fn build_rate_limiter(settings: &HttpSettings) -> DefaultDirectRateLimiter {
    let per_second = NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_second(per_second))
}

/// Map a non-success response onto the matching `FetchError`
pub(crate) async fn check_status(provider: &str, response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        404 => FetchError::NotAvailable(format!("{} returned 404", provider)),
        429 => {
            FetchError::RateLimited(format!("{} throttled the request", provider))
        }
        401 | 403 => {
            FetchError::Config(format!("{} rejected credentials ({})", provider, status))
        }
        code => FetchError::Api {
            status: code,
            message: format!("{}: {}", provider, body),
        },
    })
}

pub(crate) fn require_key<'a>(provider: &str, key: &'a Option<String>) -> Result<&'a str, FetchError> {
    key.as_deref()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| FetchError::Config(format!("{} API key not configured", provider)))
}

/// Lenient disclosure date parsing: `YYYY-MM-DD`, optionally followed by a time
pub(crate) fn parse_wire_date(raw: Option<&str>) -> Option<chrono::NaiveDate> {
    let raw = raw?.trim();
    let date_part = raw.get(..10).unwrap_or(raw);
    chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Trades dated inside `range`; undated trades are kept
pub(crate) fn within_range(
    trades: Vec<crate::types::CongressionalTrade>,
    range: crate::types::DateRange,
) -> Vec<crate::types::CongressionalTrade> {
    trades
        .into_iter()
        .filter(|t| {
            t.transaction_date
                .or(t.disclosure_date)
                .map_or(true, |d| range.contains(d))
        })
        .collect()
}
