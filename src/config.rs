//! Conversion options and persisted settings
//!
//! Settings live in `~/.config/ubitex/settings.json` and only provide
//! defaults; anything given on the command line wins.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::paths::OutputExtension;
use crate::textures::{GpuFormat, MaskLayout, ToolContainer, DEFAULT_TIMEOUT};

/// Name of the encoder binary looked up on PATH and next to our executable.
pub const ENCODER_BINARY: &str = "wimgt";

/// How each image of a batch is converted.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Produce an `APMC` colour + mask record instead of `1TXD`
    pub masked: bool,
    /// Whiten colour pixels the mask hides
    pub remask: bool,
    /// Payload layout for masked textures
    pub layout: MaskLayout,
    /// Logical extension in the output name
    pub extension: OutputExtension,
    /// Directory for outputs; next to each input when unset
    pub output_dir: Option<PathBuf>,
    pub format: GpuFormat,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            masked: false,
            remask: false,
            layout: MaskLayout::default(),
            extension: OutputExtension::default(),
            output_dir: None,
            format: GpuFormat::Cmpr,
        }
    }
}

/// User settings for ubitex
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// Path to the wimgt executable
    #[serde(default)]
    pub encoder_path: String,

    /// Default output extension (`tga` or `png`)
    #[serde(default)]
    pub extension: String,

    /// Directory for encoder scratch files
    #[serde(default)]
    pub scratch_dir: String,

    /// Per-invocation encoder timeout; 0 disables it
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Worker threads for batches (None = one per core)
    #[serde(default)]
    pub jobs: Option<usize>,

    #[serde(default)]
    pub mask_layout: Option<MaskLayout>,

    #[serde(default)]
    pub container: Option<ToolContainer>,
}

impl Settings {
    /// Get the config directory path (~/.config/ubitex)
    fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("ubitex"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Get the settings file path
    pub fn settings_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("settings.json"))
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        match Self::settings_path().and_then(|path| Self::load_from(&path)) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Could not load settings: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Load settings from a specific file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No settings file at {}", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save settings to a specific file, creating its directory.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        crate::paths::ensure_parent_dirs(path).map_err(write_err)?;
        let content = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, content).map_err(write_err)
    }

    /// Configured output extension, if any.
    pub fn extension(&self) -> Result<Option<OutputExtension>, ConfigError> {
        if self.extension.is_empty() {
            return Ok(None);
        }
        self.extension
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidSetting {
                key: "extension",
                value: self.extension.clone(),
            })
    }

    /// Configured encoder timeout. `Some(None)` means explicitly disabled.
    pub fn timeout(&self) -> Option<Option<Duration>> {
        self.timeout_secs.map(timeout_from_secs)
    }

    /// Configured worker count, rejecting zero.
    pub fn jobs(&self) -> Result<Option<usize>, ConfigError> {
        match self.jobs {
            Some(0) => Err(ConfigError::InvalidSetting {
                key: "jobs",
                value: "0".to_string(),
            }),
            other => Ok(other),
        }
    }

    pub fn scratch_dir(&self) -> Option<PathBuf> {
        (!self.scratch_dir.is_empty()).then(|| PathBuf::from(&self.scratch_dir))
    }
}

/// Seconds to encoder timeout; zero disables the timeout.
pub fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Default encoder timeout when neither CLI nor settings give one.
pub fn default_timeout() -> Option<Duration> {
    Some(DEFAULT_TIMEOUT)
}

/// Find the wimgt executable.
///
/// Order: explicit path, settings, PATH, next to our executable or in its
/// `bin/`, then `bin/` under the current directory.
pub fn locate_encoder(explicit: Option<&Path>, settings: &Settings) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return existing(path);
    }

    if !settings.encoder_path.is_empty() {
        return existing(Path::new(&settings.encoder_path));
    }

    if let Ok(path) = which::which(ENCODER_BINARY) {
        debug!("Found {} on PATH: {}", ENCODER_BINARY, path.display());
        return Ok(path);
    }

    let binary = format!("{}{}", ENCODER_BINARY, std::env::consts::EXE_SUFFIX);
    let mut candidates = Vec::new();
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(exe_dir.join(&binary));
        candidates.push(exe_dir.join("bin").join(&binary));
    }
    candidates.push(PathBuf::from("bin").join(&binary));

    candidates
        .into_iter()
        .find(|path| path.is_file())
        .ok_or(ConfigError::EncoderNotFound)
}

fn existing(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(ConfigError::EncoderMissing(path.to_path_buf()))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value for setting '{key}': {value}")]
    InvalidSetting { key: &'static str, value: String },

    #[error("Encoder not found: {0}")]
    EncoderMissing(PathBuf),

    #[error("wimgt not found. Install Wiimms Image Tool, pass --wimgt, or place wimgt in the bin/ directory.")]
    EncoderNotFound,
}
