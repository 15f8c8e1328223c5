//! Settings
//!
//! Settings come from an optional YAML file and are then overridden by
//! command-line flags. Every field has a default, so an empty or missing
//! file is valid.
//!
//! ```yaml
//! host: 127.0.0.1
//! port: 8000
//! conda_exe: /opt/conda/bin/conda
//! command_timeout_secs: 120
//! default_python: "3.12"
//! ```

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::environment::Conda;
use crate::environment::locate::locate_conda;
use crate::monitoring::activity::DEFAULT_CAPACITY;

/// Settings file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "condakeeper.yaml";

/// Application settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Explicit conda executable; detected when unset
    pub conda_exe: Option<PathBuf>,
    pub command_timeout_secs: u64,
    pub default_python: String,
    /// Entries kept in the activity log
    pub log_capacity: usize,
    /// Directory served under `/static`; may hold a custom `index.html`
    pub static_dir: PathBuf,
    pub open_browser: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            conda_exe: None,
            command_timeout_secs: 120,
            default_python: "3.12".to_string(),
            log_capacity: DEFAULT_CAPACITY,
            static_dir: PathBuf::from("static"),
            open_browser: true,
        }
    }
}

impl Settings {
    /// Loads settings from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn Error>> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Could not read settings '{}': {}", path.display(), e))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings = serde_yaml::from_str(&content)
            .map_err(|e| format!("Invalid settings '{}': {}", path.display(), e))?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Loads the given file, or the default file if present, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Base URL of the web front-end.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Builds a conda client from these settings.
    pub fn conda(&self) -> Conda {
        Conda::new(locate_conda(self.conda_exe.as_deref())).with_timeout(self.command_timeout())
    }
}
