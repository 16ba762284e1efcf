//! Configuration resolution for finlens-agg
//!
//! API keys resolve with ENV → TOML priority. Missing keys do not stop the
//! service: the affected provider reports a configuration error per request
//! and its slices degrade like any other upstream failure.

use chrono::Duration as ChronoDuration;
use finlens_common::config::{ProviderConfig, TomlConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::db::ResponseCache;
use crate::providers::{
    CachedFinancialProvider, CompletionClient, FinnhubClient, FmpClient, HouseTradesClient,
    HttpSettings, SenateTradesClient,
};
use crate::services::{Providers, RetryPolicy};
use crate::types::{FetchError, FinancialDataProvider, GenerationHint, ReasoningEffort, TradeFeed};

pub const FINANCIAL_API_KEY_ENV: &str = "FINLENS_FINANCIAL_API_KEY";
pub const NEWS_API_KEY_ENV: &str = "FINLENS_NEWS_API_KEY";
pub const HOUSE_TRADES_API_KEY_ENV: &str = "FINLENS_HOUSE_TRADES_API_KEY";
pub const COMPLETION_API_KEY_ENV: &str = "FINLENS_COMPLETION_API_KEY";

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve one API key: environment first, then TOML
pub fn resolve_api_key(name: &str, env_var: &str, toml_key: Option<&str>) -> Option<String> {
    let env_key = std::env::var(env_var).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_key.filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "{} API key found in multiple sources: environment, TOML. Using environment (highest priority).",
            name
        );
    }

    if let Some(key) = env_key {
        info!("{} API key loaded from environment variable {}", name, env_var);
        return Some(key);
    }

    if let Some(key) = toml_key {
        info!("{} API key loaded from TOML config", name);
        return Some(key.to_string());
    }

    warn!(
        "{} API key not configured. Set {} or add it to the [providers] section of finlens-agg.toml",
        name, env_var
    );
    None
}

/// API keys after tiered resolution
#[derive(Debug, Clone, Default)]
pub struct ResolvedKeys {
    pub financial: Option<String>,
    pub news: Option<String>,
    pub house_trades: Option<String>,
    pub completion: Option<String>,
}

impl ResolvedKeys {
    pub fn resolve(config: &TomlConfig) -> Self {
        let providers = &config.providers;
        Self {
            financial: resolve_api_key(
                "Financial data",
                FINANCIAL_API_KEY_ENV,
                providers.financial_api_key.as_deref(),
            ),
            news: resolve_api_key("News", NEWS_API_KEY_ENV, providers.news_api_key.as_deref()),
            house_trades: resolve_api_key(
                "House trades",
                HOUSE_TRADES_API_KEY_ENV,
                providers.house_trades_api_key.as_deref(),
            ),
            completion: resolve_api_key(
                "Completion",
                COMPLETION_API_KEY_ENV,
                providers.completion_api_key.as_deref(),
            ),
        }
    }
}

/// Runtime knobs derived from the bootstrap TOML
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub retry: RetryPolicy,
    pub store_capacity: usize,
    pub retention_days: i64,
    pub max_lock_wait_ms: u64,
    pub cache_ttl: ChronoDuration,
    pub event_capacity: usize,
    pub completion_hint: GenerationHint,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from(&TomlConfig::default())
    }
}

impl From<&TomlConfig> for ServiceSettings {
    fn from(config: &TomlConfig) -> Self {
        Self {
            retry: RetryPolicy::from(&config.retry),
            store_capacity: config.store.capacity as usize,
            retention_days: config.store.retention_days,
            max_lock_wait_ms: config.store.max_lock_wait_ms,
            cache_ttl: ChronoDuration::seconds(config.cache.ttl_seconds.max(0)),
            event_capacity: 1000,
            completion_hint: completion_hint(&config.providers),
        }
    }
}

/// Effort wins over temperature when set; unknown efforts fall back
fn completion_hint(providers: &ProviderConfig) -> GenerationHint {
    let temperature = GenerationHint::Temperature(providers.completion_temperature);
    let Some(effort) = providers.completion_effort.as_deref() else {
        return temperature;
    };
    match effort.trim().to_ascii_lowercase().as_str() {
        "low" => GenerationHint::Effort(ReasoningEffort::Low),
        "medium" => GenerationHint::Effort(ReasoningEffort::Medium),
        "high" => GenerationHint::Effort(ReasoningEffort::High),
        other => {
            warn!(
                "Unknown completion_effort '{}' (expected low, medium or high); using temperature {}",
                other, providers.completion_temperature
            );
            temperature
        }
    }
}

impl From<&TomlConfig> for HttpSettings {
    fn from(config: &TomlConfig) -> Self {
        Self {
            requests_per_second: config.providers.requests_per_second,
            timeout: Duration::from_secs(config.providers.request_timeout_secs),
        }
    }
}

/// Build production provider clients
///
/// With `cache`, financial data is read through the response cache.
pub fn build_providers(
    config: &TomlConfig,
    keys: &ResolvedKeys,
    cache: Option<(ResponseCache, ChronoDuration)>,
) -> Result<Providers, FetchError> {
    let http = HttpSettings::from(config);
    let p = &config.providers;

    let fmp: Arc<dyn FinancialDataProvider> = Arc::new(FmpClient::new(
        p.financial_base_url.clone(),
        keys.financial.clone(),
        &http,
    )?);
    let financial: Arc<dyn FinancialDataProvider> = match cache {
        Some((cache, ttl)) => Arc::new(CachedFinancialProvider::new(fmp, cache, ttl)),
        None => fmp,
    };

    // The Senate feed is served by the financial data provider and shares its key
    let trade_feeds: Vec<Arc<dyn TradeFeed>> = vec![
        Arc::new(SenateTradesClient::new(
            p.senate_trades_base_url.clone(),
            keys.financial.clone(),
            &http,
        )?),
        Arc::new(HouseTradesClient::new(
            p.house_trades_base_url.clone(),
            keys.house_trades.clone(),
            &http,
        )?),
    ];

    Ok(Providers {
        financial,
        news: Arc::new(FinnhubClient::new(p.news_base_url.clone(), keys.news.clone(), &http)?),
        trade_feeds,
        completion: Arc::new(CompletionClient::new(
            p.completion_base_url.clone(),
            keys.completion.clone(),
            p.completion_model.clone(),
            &http,
        )?),
    })
}
