//! Bootstrap configuration and root folder resolution
//!
//! Configuration is resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Built-in defaults
//!
//! A missing TOML file is not an error: the service logs a warning and starts
//! with defaults. A TOML file that exists but fails to parse IS an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit TOML config file
pub const CONFIG_ENV_VAR: &str = "FINLENS_CONFIG";

/// Environment variable naming the root (data) folder
pub const ROOT_FOLDER_ENV_VAR: &str = "FINLENS_ROOT_FOLDER";

/// Bootstrap configuration loaded from TOML
///
/// These settings cannot change while the service runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder for the database and other local state
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// SQLite database path (defaults to `<root_folder>/finlens.db`)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub providers: ProviderConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            database_path: None,
            port: default_port(),
            logging: LoggingConfig::default(),
            providers: ProviderConfig::default(),
            retry: RetryConfig::default(),
            store: StoreConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or full `EnvFilter` directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Upstream provider endpoints and credentials
///
/// API keys left empty here may still be supplied through the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub financial_base_url: String,
    pub financial_api_key: Option<String>,
    pub news_base_url: String,
    pub news_api_key: Option<String>,
    pub senate_trades_base_url: String,
    pub house_trades_base_url: String,
    pub house_trades_api_key: Option<String>,
    pub completion_base_url: String,
    pub completion_api_key: Option<String>,
    pub completion_model: String,
    /// Sampling temperature for non-reasoning models
    pub completion_temperature: f32,
    /// `low`, `medium` or `high`; when set, sent instead of the temperature
    pub completion_effort: Option<String>,
    /// Per-client request budget
    pub requests_per_second: u32,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            financial_base_url: "https://financialmodelingprep.com/api/v3".to_string(),
            financial_api_key: None,
            news_base_url: "https://finnhub.io/api/v1".to_string(),
            news_api_key: None,
            senate_trades_base_url: "https://financialmodelingprep.com/api/v4".to_string(),
            house_trades_base_url: "https://api.quiverquant.com/beta".to_string(),
            house_trades_api_key: None,
            completion_base_url: "https://api.openai.com/v1".to_string(),
            completion_api_key: None,
            completion_model: "gpt-4o-mini".to_string(),
            completion_temperature: 0.3,
            completion_effort: None,
            requests_per_second: 5,
            request_timeout_secs: 15,
        }
    }
}

/// Retry policy for flaky upstream calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

/// Saved-artifact store limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum artifacts per owner per kind
    pub capacity: u32,
    /// Days until a saved artifact expires (refreshed on re-save)
    pub retention_days: i64,
    /// Maximum time spent retrying on SQLite lock contention
    pub max_lock_wait_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            retention_days: 30,
            max_lock_wait_ms: 5000,
        }
    }
}

/// Upstream response cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_seconds: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_seconds: 3600 }
    }
}

fn default_port() -> u16 {
    5780
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration using CLI → ENV → user config dir priority
    ///
    /// Falls back to defaults (with a warning) when no file is found.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path) {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::from_file(&path)
            }
            None => {
                warn!("No configuration file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Resolve the database path, defaulting into the root folder
    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| root_folder.join("finlens.db"))
    }
}

/// Find the TOML config file to load, if any
///
/// An explicit CLI path is returned even when it does not exist, so that the
/// caller reports the error instead of silently starting with defaults.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join("finlens").join("finlens-agg.toml"));
    user_config.filter(|path| path.exists())
}

/// Root folder resolution
///
/// Priority: CLI argument → `FINLENS_ROOT_FOLDER` → TOML `root_folder` → OS default.
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("finlens"))
        .unwrap_or_else(|| PathBuf::from("./finlens_data"))
}

/// Create the root folder if it is missing
pub fn ensure_root_folder(root_folder: &Path) -> Result<()> {
    if !root_folder.exists() {
        info!("Creating root folder {}", root_folder.display());
        std::fs::create_dir_all(root_folder)?;
    }
    Ok(())
}
