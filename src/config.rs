use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const APP_DIR: &str = "tha-booth";

/// Runtime configuration. Every field has a default, so a partial (or absent)
/// config file is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BoothConfig {
    pub sample_rate: u32,
    pub buffer_frames: u32,
    /// Substring of the capture device name (a loopback/monitor source). Default input when unset.
    pub capture_device: Option<String>,
    pub output_device: Option<String>,
    pub meter_interval_ms: u64,
    pub service_base_url: String,
    pub data_dir: Option<PathBuf>,
    pub record_dir: Option<PathBuf>,
}

impl Default for BoothConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            buffer_frames: 1024,
            capture_device: None,
            output_device: None,
            meter_interval_ms: 16,
            service_base_url: "http://localhost:3000".to_string(),
            data_dir: None,
            record_dir: None,
        }
    }
}

impl BoothConfig {
    /// `<config dir>/tha-booth/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("config.json"))
    }

    /// Read a config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load from `path` if given, else from the default location, else defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => match Self::default_path() {
                Some(p) => Self::load(&p),
                None => Ok(Self::default()),
            },
        }
    }

    pub fn meter_interval(&self) -> Duration {
        Duration::from_millis(self.meter_interval_ms.max(1))
    }

    /// Where presets and flags live.
    pub fn data_root(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join(APP_DIR)))
            .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR))
    }

    /// Where saved recordings go.
    pub fn recordings_root(&self) -> PathBuf {
        self.record_dir
            .clone()
            .or_else(dirs::document_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
