//! Command-line and environment configuration tests
//!
//! Environment variables are process-wide, so these run serially.

use clap::Parser;
use serial_test::serial;
use soundmap_common::config::DEFAULT_PORT;
use soundmap_recorder::cli::Args;
use std::path::PathBuf;
use tempfile::TempDir;

const ENV_VARS: [&str; 6] = [
    "SOUNDMAP_ROOT",
    "SOUNDMAP_HOST",
    "SOUNDMAP_PORT",
    "SOUNDMAP_STATIC_DIR",
    "ELEVENLABS_API_KEY",
    "SOUNDMAP_CONFIG",
];

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

/// Args pointing at a config file that does not exist
fn parse(extra: &[&str], config_dir: &TempDir) -> Args {
    let config = config_dir.path().join("absent.toml");
    let mut argv = vec![
        "soundmap-recorder".to_string(),
        "--config".to_string(),
        config.display().to_string(),
    ];
    argv.extend(extra.iter().map(|s| s.to_string()));
    Args::try_parse_from(argv).expect("arguments should parse")
}

#[test]
#[serial]
fn test_defaults_without_flags_or_env() {
    clear_env();
    let dir = TempDir::new().unwrap();

    let config = parse(&[], &dir).load_config();
    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(config.host, "127.0.0.1");
    assert!(config.sound_api_key.is_none());
    assert!(config.static_dir.is_none());
}

#[test]
#[serial]
fn test_environment_supplies_values() {
    clear_env();
    let dir = TempDir::new().unwrap();
    std::env::set_var("SOUNDMAP_PORT", "4100");
    std::env::set_var("SOUNDMAP_ROOT", "/tmp/soundmap-env");
    std::env::set_var("ELEVENLABS_API_KEY", "secret");

    let config = parse(&[], &dir).load_config();
    clear_env();

    assert_eq!(config.port, 4100);
    assert_eq!(config.root_folder, PathBuf::from("/tmp/soundmap-env"));
    assert_eq!(
        config.store.ledger_path,
        PathBuf::from("/tmp/soundmap-env/imagedata.csv")
    );
    assert_eq!(config.sound_api_key.as_deref(), Some("secret"));
}

#[test]
#[serial]
fn test_flag_beats_environment_and_toml() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, "port = 4200\nhost = \"0.0.0.0\"\n").unwrap();
    std::env::set_var("SOUNDMAP_PORT", "4100");

    let args = Args::try_parse_from([
        "soundmap-recorder",
        "--config",
        config_path.to_str().unwrap(),
        "--port",
        "4300",
    ])
    .unwrap();
    let config = args.load_config();
    clear_env();

    assert_eq!(config.port, 4300);
    assert_eq!(config.host, "0.0.0.0", "TOML fills what flags leave unset");
    assert_eq!(config.bind_address(), "0.0.0.0:4300");
}

#[test]
#[serial]
fn test_malformed_config_file_falls_back_to_defaults() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, "port = [not valid").unwrap();

    let args = Args::try_parse_from([
        "soundmap-recorder",
        "--config",
        config_path.to_str().unwrap(),
    ])
    .unwrap();
    assert_eq!(args.load_config().port, DEFAULT_PORT);
}

#[test]
#[serial]
fn test_invalid_port_is_rejected() {
    clear_env();
    let result = Args::try_parse_from(["soundmap-recorder", "--port", "not-a-port"]);
    assert!(result.is_err());
}
