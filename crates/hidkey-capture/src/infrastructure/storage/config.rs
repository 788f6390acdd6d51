//! TOML-based configuration for the capture shell.
//!
//! Reads and writes [`AppConfig`] at the platform-appropriate path:
//! - Windows:  `%APPDATA%\HidKey\config.toml`
//! - Linux:    `~/.config/hidkey/config.toml`
//! - macOS:    `~/Library/Application Support/HidKey/config.toml`
//!
//! Example:
//!
//! ```toml
//! [capture]
//! log_level = "debug"
//! auto_attach = true
//! request_on_start = false
//!
//! [[capture.filters]]
//! usage_page = 1
//! usage = 6
//!
//! [consumers]
//! text = true
//! alert_on_submit = true
//!
//! [[allowed_devices]]
//! vendor_id = 0x046d
//! product_id = 0xc31c
//! ```
//!
//! A missing file yields [`AppConfig::default()`]; missing fields fall back
//! to their per-field defaults.

use std::path::{Path, PathBuf};

use hidkey_core::DeviceFilter;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub consumers: ConsumerConfig,
    /// Devices the native host may expose.
    #[serde(default)]
    pub allowed_devices: Vec<AllowedDevice>,
}

/// Session behaviour at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Attach the first previously granted device on startup.
    #[serde(default = "default_true")]
    pub auto_attach: bool,
    /// Prompt for a device on startup when none is granted.
    #[serde(default = "default_true")]
    pub request_on_start: bool,
    /// Usage filters passed to device selection.
    #[serde(default = "default_filters")]
    pub filters: Vec<DeviceFilter>,
}

/// Which built-in consumers to register.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsumerConfig {
    #[serde(default = "default_true")]
    pub text: bool,
    #[serde(default)]
    pub alert_on_submit: bool,
}

/// A vendor/product pair the native host is allowed to expose.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllowedDevice {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl AppConfig {
    /// Allow-list as `(vendor_id, product_id)` pairs.
    pub fn allowed_pairs(&self) -> Vec<(u16, u16)> {
        self.allowed_devices
            .iter()
            .map(|d| (d.vendor_id, d.product_id))
            .collect()
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_filters() -> Vec<DeviceFilter> {
    vec![DeviceFilter::KEYBOARD]
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            auto_attach: default_true(),
            request_on_start: default_true(),
            filters: default_filters(),
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            text: default_true(),
            alert_on_submit: false,
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the base directory
/// cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the platform path.  See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, returning the defaults if the file does
/// not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to the platform path.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Writes `config` to `path`, creating the parent directory if needed.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("HidKey"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("hidkey"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("HidKey"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
