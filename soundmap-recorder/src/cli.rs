//! Command-line arguments and configuration loading

use clap::Parser;
use soundmap_common::config::{default_config_path, load_toml_config, ConfigOverrides};
use soundmap_common::ServiceConfig;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "soundmap-recorder",
    version,
    about = "Stores recording submissions and maintains the shared ledger"
)]
pub struct Args {
    /// Store root (holds `users/` and `imagedata.csv`)
    #[arg(long, env = "SOUNDMAP_ROOT")]
    pub root_folder: Option<PathBuf>,

    /// Bind address
    #[arg(long, env = "SOUNDMAP_HOST")]
    pub host: Option<String>,

    /// HTTP port
    #[arg(long, env = "SOUNDMAP_PORT")]
    pub port: Option<u16>,

    /// Directory with the front-end pages
    #[arg(long, env = "SOUNDMAP_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    /// Largest accepted request body in bytes
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// API key for the sound generation service
    #[arg(long, env = "ELEVENLABS_API_KEY", hide_env_values = true)]
    pub sound_api_key: Option<String>,

    /// TOML config file (defaults to the platform config directory)
    #[arg(long, env = "SOUNDMAP_CONFIG")]
    pub config: Option<PathBuf>,
}

impl Args {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            root_folder: self.root_folder.clone(),
            host: self.host.clone(),
            port: self.port,
            static_dir: self.static_dir.clone(),
            max_upload_bytes: self.max_upload_bytes,
            sound_api_key: self.sound_api_key.clone(),
        }
    }

    /// Resolve the service configuration
    ///
    /// A missing or malformed TOML file falls back to defaults with a warning.
    pub fn load_config(&self) -> ServiceConfig {
        let toml = match self.config.clone().or_else(default_config_path) {
            Some(path) => match load_toml_config(&path) {
                Ok(Some(toml)) => {
                    info!(path = %path.display(), "Loaded config file");
                    Some(toml)
                }
                Ok(None) => None,
                Err(e) => {
                    warn!(error = %e, "Ignoring config file");
                    None
                }
            },
            None => None,
        };

        ServiceConfig::resolve(self.overrides(), toml.as_ref())
    }
}
