//! `[logging]`: the toolbar's own diagnostics
//!
//! These settings shape the process-wide subscriber the demo binary installs.
//! Records collected by the logging panel go through that same subscriber,
//! so `level` also bounds what the panel can show.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::RollingFileAppender;

/// When the JSON log file rolls over
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    #[default]
    Daily,
    /// One file for the life of the process
    Never,
}

impl LogRotation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Never => "never",
        }
    }

    /// Writer producing `{dir}/{prefix}.{period}` files
    pub fn appender(&self, dir: &Path, prefix: &str) -> RollingFileAppender {
        match self {
            Self::Hourly => tracing_appender::rolling::hourly(dir, prefix),
            Self::Daily => tracing_appender::rolling::daily(dir, prefix),
            Self::Never => tracing_appender::rolling::never(dir, prefix),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Level for the toolbar and the demo app; `RUST_LOG` overrides it
    pub level: String,
    /// Mirror stdout records into rolling JSON files
    pub file_enabled: bool,
    pub file_dir: PathBuf,
    pub file_rotation: LogRotation,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_enabled: false,
            file_dir: PathBuf::from("./logs"),
            file_rotation: LogRotation::Daily,
            file_prefix: "debug-toolbar".to_string(),
        }
    }
}

/// `[logging]` as written in the file; every key optional
#[derive(Debug, Deserialize, Default)]
pub struct FileLogging {
    pub level: Option<String>,
    pub file_enabled: Option<bool>,
    pub file_dir: Option<PathBuf>,
    pub file_rotation: Option<LogRotation>,
    pub file_prefix: Option<String>,
}

impl LoggingConfig {
    pub fn from_file(file: Option<FileLogging>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            level: file.level.unwrap_or(defaults.level),
            file_enabled: file.file_enabled.unwrap_or(defaults.file_enabled),
            file_dir: file.file_dir.unwrap_or(defaults.file_dir),
            file_rotation: file.file_rotation.unwrap_or(defaults.file_rotation),
            file_prefix: file.file_prefix.unwrap_or(defaults.file_prefix),
        }
    }

    /// `EnvFilter` directives used when `RUST_LOG` is unset
    ///
    /// The toolbar's own target always follows `level`, and `tower_http`
    /// request traces stay at debug.
    pub fn default_filter(&self) -> String {
        format!(
            "debug_toolbar={level},{level},tower_http=debug",
            level = self.level
        )
    }
}
