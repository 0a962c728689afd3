//! Configuration management for autodeps

pub mod schema;

pub use schema::Config;

use crate::error::{AutodepsError, AutodepsResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// File names searched for in the project root, in order
pub const CONFIG_FILES: &[&str] = &["autodeps.toml", "autodeps.json"];

/// Configuration manager
pub struct ConfigManager {
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Discover the configuration file inside `root`
    pub fn discover(root: &Path) -> Self {
        let config_path = CONFIG_FILES
            .iter()
            .map(|name| root.join(name))
            .find(|path| path.is_file());
        if let Some(ref path) = config_path {
            debug!("Found config: {}", path.display());
        }
        Self { config_path }
    }

    /// Create a config manager for an explicit file
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            config_path: Some(path),
        }
    }

    /// Load configuration, falling back to defaults when no file was found
    pub async fn load(&self) -> AutodepsResult<Config> {
        match self.config_path {
            Some(ref path) => Self::load_from_file(path).await,
            None => {
                debug!("No config file, using defaults");
                Ok(Config::default())
            }
        }
    }

    /// Load configuration from a specific file (TOML, or JSON by extension)
    pub async fn load_from_file(path: &Path) -> AutodepsResult<Config> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AutodepsError::ConfigNotFound(path.to_path_buf()));
            }
            Err(e) => {
                return Err(AutodepsError::io(
                    format!("reading config from {}", path.display()),
                    e,
                ));
            }
        };

        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let parsed: Result<Config, String> = if is_json {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            toml::from_str(&content).map_err(|e| e.to_string())
        };

        parsed.map_err(|reason| AutodepsError::ConfigInvalid {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Path of the configuration file in use, if any
    pub fn path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}
