//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\music-leveler\config.toml
//! - macOS: ~/Library/Application Support/music-leveler/config.toml
//! - Linux: ~/.config/music-leveler/config.toml
//!
//! Every value has a default and command-line flags override the file, so
//! the file is optional. The engine never reads it directly; it gets a
//! validated [`NormalizeSettings`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::scanner::ExtensionSet;

/// Default tolerance band radius in dB.
pub const DEFAULT_TOLERANCE_DB: f64 = 2.0;
/// Default worker count for the measurement phase.
pub const DEFAULT_MEASUREMENT_CONCURRENCY: usize = 4;
/// Default worker count for the rewrite phase.
pub const DEFAULT_REWRITE_CONCURRENCY: usize = 2;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Normalization behaviour
    pub normalize: NormalizeConfig,

    /// External tools
    pub tools: ToolsConfig,

    /// Library location
    pub library: LibraryConfig,
}

/// Normalization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Files within this many dB of the target are left alone
    pub tolerance_db: f64,

    /// Fixed target in dBFS; the library median is used when unset
    pub target_loudness: Option<f64>,

    /// Recognized audio extensions
    pub extensions: ExtensionSet,

    /// Workers for the measurement phase
    pub measurement_concurrency: usize,

    /// Workers for the rewrite phase
    pub rewrite_concurrency: usize,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            tolerance_db: DEFAULT_TOLERANCE_DB,
            target_loudness: None,
            extensions: ExtensionSet::default(),
            measurement_concurrency: DEFAULT_MEASUREMENT_CONCURRENCY,
            rewrite_concurrency: DEFAULT_REWRITE_CONCURRENCY,
        }
    }
}

/// External tool locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// ffmpeg binary (searched for when unset)
    pub ffmpeg_path: Option<PathBuf>,
}

/// Library settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Directory used when none is given on the command line
    pub directory: Option<PathBuf>,
}

/// Validated settings handed to the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeSettings {
    pub target_loudness: Option<f64>,
    pub tolerance_db: f64,
    pub extensions: ExtensionSet,
    pub measurement_concurrency: usize,
    pub rewrite_concurrency: usize,
    /// Decide what would change without writing anything
    pub dry_run: bool,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self::from(&NormalizeConfig::default())
    }
}

impl From<&NormalizeConfig> for NormalizeSettings {
    fn from(config: &NormalizeConfig) -> Self {
        Self {
            target_loudness: config.target_loudness,
            tolerance_db: config.tolerance_db,
            extensions: config.extensions.clone(),
            measurement_concurrency: config.measurement_concurrency,
            rewrite_concurrency: config.rewrite_concurrency,
            dry_run: false,
        }
    }
}

impl NormalizeSettings {
    /// Reject settings that would make the run meaningless.
    pub fn validate(&self) -> Result<()> {
        if !self.tolerance_db.is_finite() || self.tolerance_db < 0.0 {
            return Err(Error::config(format!(
                "tolerance must be a non-negative number of dB, got {}",
                self.tolerance_db
            )));
        }
        if let Some(target) = self.target_loudness
            && (!target.is_finite() || target > 0.0)
        {
            return Err(Error::config(format!(
                "target loudness must be at or below 0 dBFS, got {target}"
            )));
        }
        if self.measurement_concurrency == 0 || self.rewrite_concurrency == 0 {
            return Err(Error::config("worker counts must be at least 1"));
        }
        if self.extensions.is_empty() {
            return Err(Error::config("no audio extensions configured"));
        }
        Ok(())
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("music-leveler"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::debug!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to disk
///
/// Creates the config directory if it doesn't exist.
pub fn save(config: &Config) -> std::result::Result<PathBuf, ConfigError> {
    let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    let path = dir.join("config.toml");

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::CreateDir(dir.clone(), e))?;

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, &path)
        .map_err(|e| ConfigError::Rename(temp_path, path.clone(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(path)
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
