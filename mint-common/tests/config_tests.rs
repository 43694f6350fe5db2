//! Integration tests for configuration loading and graceful degradation
//!
//! Tests that manipulate MINT_CONFIG are marked with #[serial] so they do
//! not race each other on the process environment.

use mint_common::config::{ConfigResolver, TomlConfig, ENV_CONFIG_PATH};
use mint_common::Error;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
#[serial]
fn test_cli_path_takes_priority_over_env() {
    let dir = TempDir::new().unwrap();
    let cli = write_config(&dir, "[stream]\nchart_size = 50\n");
    env::set_var(ENV_CONFIG_PATH, "/nonexistent/mint.toml");

    let resolver = ConfigResolver::new(Some(cli.clone()));
    assert_eq!(resolver.resolve_path(), Some(cli));

    let config = resolver.load().unwrap();
    assert_eq!(config.stream.chart_size, 50);

    env::remove_var(ENV_CONFIG_PATH);
}

#[test]
#[serial]
fn test_env_var_used_without_cli() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        [simulator]
        port = 9100

        [logging]
        level = "debug"
        "#,
    );
    env::set_var(ENV_CONFIG_PATH, &path);

    let config = ConfigResolver::new(None).load().unwrap();
    assert_eq!(config.simulator.port, 9100);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.stream.chart_size, 20);

    env::remove_var(ENV_CONFIG_PATH);
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    env::remove_var(ENV_CONFIG_PATH);
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.toml");

    let config = ConfigResolver::new(Some(missing)).load().unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_malformed_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[stream\nchart_size = ");

    let result = TomlConfig::from_file(&path);
    assert!(matches!(result, Err(Error::Toml(_))));
}

#[test]
fn test_invalid_values_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[stream]\nbatches_per_second = 0\n");

    let result = TomlConfig::from_file(&path);
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_session_limit_can_be_disabled() {
    let config: TomlConfig = toml::from_str("[stream]\nclose_timeout_ms = 250\n").unwrap();
    assert_eq!(config.stream.close_timeout_ms, 250);
    assert!(config.stream.session_limit().is_some());

    let mut settings = config.stream;
    settings.session_limit_secs = None;
    assert!(settings.session_limit().is_none());
}
