//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{FramecutError, FramecutResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Media engine settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Font resolution settings.
    #[serde(default)]
    pub fonts: FontConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Media engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path or name of the ffmpeg binary.
    pub ffmpeg_binary: String,

    /// Root directory under which each engine session keeps its input space.
    pub work_dir: PathBuf,

    /// Keep the session directory after the engine is terminated.
    pub keep_work_dir: bool,
}

/// Font resolution parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    /// Directory holding the `.ttf` files.
    pub dir: PathBuf,

    /// Family used when a requested family cannot be resolved.
    pub default_family: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "framecut=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            fonts: FontConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_binary: "ffmpeg".to_string(),
            work_dir: std::env::temp_dir().join("framecut"),
            keep_work_dir: false,
        }
    }
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            dir: dirs_default_fonts(),
            default_family: "Inter".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if !config_path.exists() {
            return Self::default();
        }
        match Self::from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{e}, using defaults");
                Self::default()
            }
        }
    }

    /// Load config from an explicit path.
    pub fn from_file(path: &Path) -> FramecutResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FramecutError::config(format!("Failed to read config at {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            FramecutError::config(format!("Failed to parse config at {}: {e}", path.display()))
        })
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("framecut").join("config.json")
}

/// Default font directory.
fn dirs_default_fonts() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("framecut").join("fonts")
}
