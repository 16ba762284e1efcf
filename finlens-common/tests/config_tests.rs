//! Tests for bootstrap configuration loading and root folder resolution
//!
//! Tests that manipulate FINLENS_* environment variables are marked #[serial]
//! so they do not race each other.

use finlens_common::config::{
    resolve_config_path, resolve_root_folder, TomlConfig, CONFIG_ENV_VAR, ROOT_FOLDER_ENV_VAR,
};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};

#[test]
fn test_defaults_when_sections_missing() {
    let config = TomlConfig::from_toml_str("port = 6000\n").unwrap();

    assert_eq!(config.port, 6000);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.base_delay_ms, 1000);
    assert_eq!(config.store.capacity, 20);
    assert_eq!(config.cache.ttl_seconds, 3600);
    assert!(config.providers.financial_api_key.is_none());
}

#[test]
fn test_partial_section_keeps_other_defaults() {
    let toml = r#"
        [store]
        capacity = 5

        [providers]
        completion_model = "local-model"
    "#;
    let config = TomlConfig::from_toml_str(toml).unwrap();

    assert_eq!(config.store.capacity, 5);
    assert_eq!(config.store.retention_days, 30);
    assert_eq!(config.providers.completion_model, "local-model");
    assert_eq!(config.providers.requests_per_second, 5);
    assert_eq!(config.providers.completion_temperature, 0.3);
    assert!(config.providers.completion_effort.is_none());
}

#[test]
fn test_invalid_toml_is_config_error() {
    let err = TomlConfig::from_toml_str("port = \"not a number\"").unwrap_err();
    assert!(matches!(err, finlens_common::Error::Config(_)));
}

#[test]
fn test_from_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("finlens-agg.toml");
    std::fs::write(&path, "port = 7001\n[logging]\nlevel = \"debug\"\n").unwrap();

    let config = TomlConfig::from_file(&path).unwrap();
    assert_eq!(config.port, 7001);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_database_path_defaults_into_root_folder() {
    let config = TomlConfig::default();
    let db = config.database_path(Path::new("/tmp/finlens-root"));
    assert_eq!(db, PathBuf::from("/tmp/finlens-root/finlens.db"));
}

#[test]
#[serial]
fn test_cli_config_path_wins_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");
    let resolved = resolve_config_path(Some(Path::new("/tmp/from-cli.toml")));
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved, Some(PathBuf::from("/tmp/from-cli.toml")));
}

#[test]
#[serial]
fn test_env_config_path_used_without_cli() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");
    let resolved = resolve_config_path(None);
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved, Some(PathBuf::from("/tmp/from-env.toml")));
}

#[test]
#[serial]
fn test_root_folder_priority() {
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/from-toml")),
        ..TomlConfig::default()
    };

    env::set_var(ROOT_FOLDER_ENV_VAR, "/tmp/from-env");
    assert_eq!(
        resolve_root_folder(Some(Path::new("/tmp/from-cli")), &toml),
        PathBuf::from("/tmp/from-cli")
    );
    assert_eq!(resolve_root_folder(None, &toml), PathBuf::from("/tmp/from-env"));

    env::remove_var(ROOT_FOLDER_ENV_VAR);
    assert_eq!(resolve_root_folder(None, &toml), PathBuf::from("/tmp/from-toml"));

    let bare = TomlConfig::default();
    assert!(!resolve_root_folder(None, &bare).as_os_str().is_empty());
}
