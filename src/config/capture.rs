//! Traceback capture configuration

use serde::Deserialize;

use crate::capture::{CaptureSettings, DEFAULT_MAX_VALUE_LEN};

/// Capture configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Innermost span frames dropped from every traceback
    pub skip_frames: usize,
    /// Drop frames whose module starts with one of `system_prefixes`
    pub hide_system_frames: bool,
    pub system_prefixes: Vec<String>,
    /// Source lines shown either side of a frame's line
    pub context_lines: u32,
    /// Byte limit for displayed local values
    pub max_value_len: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let settings = CaptureSettings::default();
        Self {
            skip_frames: settings.skip_frames,
            hide_system_frames: settings.hide_system_frames,
            system_prefixes: settings.system_prefixes,
            context_lines: settings.context_lines,
            max_value_len: DEFAULT_MAX_VALUE_LEN,
        }
    }
}

/// Capture settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileCapture {
    pub skip_frames: Option<usize>,
    pub hide_system_frames: Option<bool>,
    pub system_prefixes: Option<Vec<String>>,
    pub context_lines: Option<u32>,
    pub max_value_len: Option<usize>,
}

impl CaptureConfig {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileCapture>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            skip_frames: file.skip_frames.unwrap_or(defaults.skip_frames),
            hide_system_frames: file.hide_system_frames.unwrap_or(defaults.hide_system_frames),
            system_prefixes: file.system_prefixes.unwrap_or(defaults.system_prefixes),
            context_lines: file.context_lines.unwrap_or(defaults.context_lines),
            max_value_len: file.max_value_len.unwrap_or(defaults.max_value_len).max(1),
        }
    }

    /// Settings handed to the traceback builder
    pub fn settings(&self) -> CaptureSettings {
        CaptureSettings {
            skip_frames: self.skip_frames,
            hide_system_frames: self.hide_system_frames,
            system_prefixes: self.system_prefixes.clone(),
            context_lines: self.context_lines,
        }
    }
}
