//! Configuration for the debug toolbar
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/debug-toolbar/config.toml)
//! 3. Built-in defaults (lowest priority)

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod capture;
mod observability;
mod serialization;
mod toolbar;

#[cfg(test)]
mod tests;

pub use capture::{CaptureConfig, FileCapture};
pub use observability::{FileLogging, LogRotation, LoggingConfig};
pub use toolbar::{
    normalize_prefix, FileHistory, FileToolbar, HistoryConfig, InterceptMode, ToolbarConfig,
    DEFAULT_GLOBAL_PANELS, DEFAULT_PANELS, DEFAULT_REDIRECT_CODES,
};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_BIND: &str = "127.0.0.1:5000";

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Address the demo server binds to
    pub bind_addr: SocketAddr,

    /// Toolbar behavior
    pub toolbar: ToolbarConfig,

    /// History capacities
    pub history: HistoryConfig,

    /// Traceback capture settings
    pub capture: CaptureConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            toolbar: ToolbarConfig::default(),
            history: HistoryConfig::default(),
            capture: CaptureConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub bind_addr: Option<String>,

    /// Optional [toolbar] section
    pub toolbar: Option<FileToolbar>,

    /// Optional [history] section
    pub history: Option<FileHistory>,

    /// Optional [capture] section
    pub capture: Option<FileCapture>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/debug-toolbar/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("debug-toolbar").join("config.toml"))
    }

    /// Create config file with defaults if it doesn't exist
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };

        if path.exists() {
            return;
        }

        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return; // config is optional
            }
        }

        // Config::default().to_toml() is the single source of truth
        let _ = std::fs::write(&path, Self::default().to_toml());
    }

    /// Load the config file if it exists
    fn load_file_config() -> Result<FileConfig, ConfigError> {
        let Some(path) = Self::config_path() else {
            return Ok(FileConfig::default());
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::parse_file(&contents, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }

    fn parse_file(contents: &str, path: PathBuf) -> Result<FileConfig, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Load configuration: env vars > file > defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = Self::load_file_config()?;
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Parse a config file's text and apply defaults (no environment)
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let file = Self::parse_file(contents, PathBuf::from("<inline>"))?;
        Self::from_sources(file, |_| None)
    }

    /// Merge file values with an environment lookup
    pub(crate) fn from_sources(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        // Bind address: env > file > default
        let bind = env("DEBUG_TOOLBAR_BIND")
            .or(file.bind_addr)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr = bind.parse().map_err(|_| ConfigError::Invalid {
            key: "bind_addr",
            value: bind.clone(),
        })?;

        let mut toolbar = ToolbarConfig::from_file(file.toolbar);

        // Enabled: env > file > default
        if let Some(value) = env("DEBUG_TOOLBAR_ENABLED") {
            toolbar.enabled = parse_bool(&value).ok_or(ConfigError::Invalid {
                key: "DEBUG_TOOLBAR_ENABLED",
                value,
            })?;
        }

        // Interception: env > file > default
        if let Some(value) = env("DEBUG_TOOLBAR_INTERCEPT") {
            toolbar.intercept_exc = InterceptMode::from_str(&value);
        }

        Ok(Self {
            bind_addr,
            toolbar,
            history: HistoryConfig::from_file(file.history),
            capture: CaptureConfig::from_file(file.capture),
            logging: LoggingConfig::from_file(file.logging),
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
