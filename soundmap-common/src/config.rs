//! Configuration loading and root folder resolution
//!
//! Every value follows the same priority order:
//! 1. Command-line argument or environment variable (clap handles both)
//! 2. TOML config file
//! 3. Compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3001;

/// Default bind address
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default upper bound for one multipart submission (100 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Name of the per-user directory tree under the root folder
pub const USERS_DIR_NAME: &str = "users";

/// Name of the shared ledger file under the root folder
pub const LEDGER_FILE_NAME: &str = "imagedata.csv";

/// Filesystem locations of the durable store
///
/// Passed explicitly to every store component so tests can point them at
/// a temporary root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Parent of all per-user directories
    pub users_dir: PathBuf,
    /// Shared CSV ledger consumed by the rendering surface
    pub ledger_path: PathBuf,
    /// Relative prefix written into ledger paths (`<prefix>/<user>/<file>`)
    pub media_prefix: String,
}

impl StoreConfig {
    /// Standard layout: `<root>/users` and `<root>/imagedata.csv`
    pub fn under_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            users_dir: root.join(USERS_DIR_NAME),
            ledger_path: root.join(LEDGER_FILE_NAME),
            media_prefix: USERS_DIR_NAME.to_string(),
        }
    }
}

/// Optional settings read from the TOML config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub static_dir: Option<PathBuf>,
    pub max_upload_bytes: Option<usize>,
    pub sound_api_key: Option<String>,
}

/// Values supplied on the command line (or their environment fallbacks)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub root_folder: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub static_dir: Option<PathBuf>,
    pub max_upload_bytes: Option<usize>,
    pub sound_api_key: Option<String>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub root_folder: PathBuf,
    pub store: StoreConfig,
    pub host: String,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
    pub sound_api_key: Option<String>,
}

impl ServiceConfig {
    /// Merge overrides, TOML values and compiled defaults
    pub fn resolve(overrides: ConfigOverrides, toml: Option<&TomlConfig>) -> Self {
        let toml = toml.cloned().unwrap_or_default();

        let root_folder = overrides
            .root_folder
            .or(toml.root_folder)
            .unwrap_or_else(default_root_folder);

        let sound_api_key = overrides
            .sound_api_key
            .or(toml.sound_api_key)
            .filter(|key| !key.trim().is_empty());

        Self {
            store: StoreConfig::under_root(&root_folder),
            root_folder,
            host: overrides
                .host
                .or(toml.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: overrides.port.or(toml.port).unwrap_or(DEFAULT_PORT),
            static_dir: overrides.static_dir.or(toml.static_dir),
            max_upload_bytes: overrides
                .max_upload_bytes
                .or(toml.max_upload_bytes)
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            sound_api_key,
        }
    }

    /// `host:port` string suitable for binding a listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Load the TOML config file
///
/// A missing file is not an error (`Ok(None)`); unreadable or malformed
/// files are reported as `Error::Config`.
pub fn load_toml_config(path: &Path) -> Result<Option<TomlConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    Ok(Some(config))
}

/// Platform config file location (`~/.config/soundmap/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("soundmap").join("config.toml"))
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("soundmap"))
        .unwrap_or_else(|| PathBuf::from("./soundmap_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_layout_under_root() {
        let store = StoreConfig::under_root("/srv/soundmap");
        assert_eq!(store.users_dir, PathBuf::from("/srv/soundmap/users"));
        assert_eq!(store.ledger_path, PathBuf::from("/srv/soundmap/imagedata.csv"));
        assert_eq!(store.media_prefix, "users");
    }

    #[test]
    fn test_overrides_beat_toml() {
        let toml = TomlConfig {
            root_folder: Some(PathBuf::from("/from/toml")),
            port: Some(4000),
            ..Default::default()
        };
        let overrides = ConfigOverrides {
            port: Some(5000),
            ..Default::default()
        };

        let config = ServiceConfig::resolve(overrides, Some(&toml));
        assert_eq!(config.port, 5000);
        assert_eq!(config.root_folder, PathBuf::from("/from/toml"));
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn test_blank_api_key_treated_as_absent() {
        let overrides = ConfigOverrides {
            sound_api_key: Some("   ".to_string()),
            ..Default::default()
        };
        let config = ServiceConfig::resolve(overrides, None);
        assert!(config.sound_api_key.is_none());
    }
}
