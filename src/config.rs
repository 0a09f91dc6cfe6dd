use crate::store::default_store_path;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    pub version: u32,
    /// Registry file to use instead of the default under the data dir
    #[serde(default)]
    pub store: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            store: None,
        }
    }
}

impl Config {
    /// Load the user config. Missing or broken files give the defaults.
    pub fn load() -> Self {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(data) = std::fs::read_to_string(path) else {
            debug!(path = %path.display(), "no config file, using defaults");
            return Self::default();
        };

        match serde_json::from_str(&data) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring malformed config");
                Self::default()
            }
        }
    }

    /// Registry location: explicit override, then config, then the default.
    pub fn store_path(&self, cli_override: Option<PathBuf>) -> anyhow::Result<PathBuf> {
        if let Some(p) = cli_override {
            return Ok(p);
        }
        if let Some(ref p) = self.store {
            return Ok(p.clone());
        }
        default_store_path()
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("auth-manager").join("config.json"))
}
