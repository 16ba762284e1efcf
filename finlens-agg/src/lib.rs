//! finlens-agg library interface
//!
//! Exposes the aggregation services, stores and router for the binary and
//! for integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod providers;
pub mod services;
pub mod types;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use finlens_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServiceSettings;
use crate::db::{ArtifactStore, ResponseCache};
use crate::services::{AggregateFetcher, ArtifactGenerator, Providers, RunRegistry};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub store: ArtifactStore,
    pub cache: ResponseCache,
    pub fetcher: Arc<AggregateFetcher>,
    pub generator: Arc<ArtifactGenerator>,
    /// In-flight fetch runs, for supersession
    pub runs: RunRegistry,
    /// Cancelled on shutdown; parent of generation tokens
    pub shutdown: CancellationToken,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        providers: Providers,
        settings: &ServiceSettings,
    ) -> Self {
        let store = ArtifactStore::new(db.clone(), settings.store_capacity, settings.retention_days)
            .with_max_lock_wait_ms(settings.max_lock_wait_ms)
            .with_events(event_bus.clone());
        let cache = ResponseCache::new(db.clone()).with_max_lock_wait_ms(settings.max_lock_wait_ms);

        let completion = providers.completion.clone();
        let fetcher = Arc::new(
            AggregateFetcher::new(providers, settings.retry).with_events(event_bus.clone()),
        );
        let generator = Arc::new(ArtifactGenerator::new(
            fetcher.clone(),
            completion,
            store.clone(),
            settings.retry,
        )
        .with_hint(settings.completion_hint));

        Self {
            db,
            event_bus,
            store,
            cache,
            fetcher,
            generator,
            runs: RunRegistry::new(),
            shutdown: CancellationToken::new(),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn record_error(&self, message: String) {
        *self.last_error.write().await = Some(message);
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::aggregate_routes())
        .merge(api::artifact_routes())
        .merge(api::generate_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically purge expired artifacts and cache entries until shutdown
pub async fn run_retention_purge(state: AppState, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = state.shutdown.cancelled() => {
                info!("Retention purge stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        if let Err(e) = state.store.purge_expired().await {
            warn!(error = %e, "Artifact purge failed");
            state.record_error(e.to_string()).await;
        }
        if let Err(e) = state.cache.purge_expired().await {
            warn!(error = %e, "Cache purge failed");
        }
    }
}
