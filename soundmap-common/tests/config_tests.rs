//! Tests for TOML config loading and graceful degradation
//!
//! - Missing TOML file SHALL NOT be an error
//! - Malformed TOML is reported as a configuration error
//! - TOML values feed into the resolved service configuration

use soundmap_common::config::{load_toml_config, ConfigOverrides, TomlConfig};
use soundmap_common::{Error, ServiceConfig};
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_missing_toml_file_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");

    let loaded = load_toml_config(&path).expect("missing file must not fail");
    assert!(loaded.is_none());
}

#[test]
fn test_toml_values_are_loaded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
root_folder = "/var/lib/soundmap"
port = 8080
static_dir = "/srv/www"
"#,
    )
    .unwrap();

    let toml = load_toml_config(&path).unwrap().expect("file exists");
    assert_eq!(toml.port, Some(8080));

    let config = ServiceConfig::resolve(ConfigOverrides::default(), Some(&toml));
    assert_eq!(config.port, 8080);
    assert_eq!(config.root_folder, PathBuf::from("/var/lib/soundmap"));
    assert_eq!(config.store.users_dir, PathBuf::from("/var/lib/soundmap/users"));
    assert_eq!(config.static_dir, Some(PathBuf::from("/srv/www")));
    assert_eq!(config.bind_address(), "127.0.0.1:8080");
}

#[test]
fn test_malformed_toml_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "port = \"not a number").unwrap();

    match load_toml_config(&path) {
        Err(Error::Config(msg)) => assert!(msg.contains("Parse")),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn test_unknown_keys_are_ignored() {
    let toml: TomlConfig = toml::from_str("port = 9000\nfuture_option = true").unwrap();
    assert_eq!(toml.port, Some(9000));
}
