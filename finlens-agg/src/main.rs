//! finlens-agg - multi-source aggregation microservice
//!
//! Fans out to financial, news, congressional-trading and completion
//! providers, reports per-slice status, and persists generated reports and
//! predictions with bounded per-owner capacity.

use anyhow::Result;
use clap::Parser;
use finlens_common::config::{ensure_root_folder, resolve_root_folder, TomlConfig};
use finlens_common::events::EventBus;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use finlens_agg::config::{build_providers, ResolvedKeys, ServiceSettings};
use finlens_agg::AppState;

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Parser)]
#[command(name = "finlens-agg", version, about = "finlens multi-source aggregation service")]
struct Args {
    /// HTTP port (overrides TOML)
    #[arg(long, env = "FINLENS_PORT")]
    port: Option<u16>,

    /// Bootstrap TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root folder for the database
    #[arg(long)]
    root_folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = TomlConfig::load(args.config.as_deref())?;

    let default_filter = format!(
        "finlens_agg={},tower_http={}",
        toml_config.logging.level, toml_config.logging.level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let port = args.port.unwrap_or(toml_config.port);
    info!("Starting finlens-agg (aggregation) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Root folder and database
    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    ensure_root_folder(&root_folder)?;
    let db_path = toml_config.database_path(&root_folder);
    info!("Database: {}", db_path.display());

    let db_pool = finlens_agg::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    let settings = ServiceSettings::from(&toml_config);
    let event_bus = EventBus::new(settings.event_capacity);

    // Upstream providers
    let keys = ResolvedKeys::resolve(&toml_config);
    let cache = finlens_agg::db::ResponseCache::new(db_pool.clone())
        .with_max_lock_wait_ms(settings.max_lock_wait_ms);
    let providers = build_providers(&toml_config, &keys, Some((cache, settings.cache_ttl)))?;

    let state = AppState::new(db_pool, event_bus, providers, &settings);
    let shutdown = state.shutdown.clone();
    let runs = state.runs.clone();

    tokio::spawn(finlens_agg::run_retention_purge(state.clone(), PURGE_INTERVAL));

    let app = finlens_agg::build_router(state);

    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            shutdown.cancel();
            runs.cancel_all().await;
        })
        .await?;

    Ok(())
}
