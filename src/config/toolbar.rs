//! Toolbar behavior and history sizes
//!
//! - Toolbar: enablement, access control, prefix, interception, panels
//! - History: capacities of the request/exception/frame stores

use serde::Deserialize;

// ─────────────────────────────────────────────────────────────────────────────
// Interception Mode
// ─────────────────────────────────────────────────────────────────────────────

/// What happens when an instrumented handler fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InterceptMode {
    /// Show the traceback page with the interactive console (default)
    #[default]
    Debug,
    /// Show the traceback page without the console
    Display,
    /// Record the request and pass the failure through untouched
    Off,
}

impl InterceptMode {
    /// Parse mode string from config
    ///
    /// Accepts `false`/`off`/`none` for [`Off`](Self::Off); unknown values
    /// fall back to the default.
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "debug" => Self::Debug,
            "display" => Self::Display,
            "off" | "false" | "none" | "0" => Self::Off,
            _ => Self::default(),
        }
    }

    /// Convert to string for TOML serialization
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Display => "display",
            Self::Off => "off",
        }
    }

    /// Whether failures become traceback pages
    pub fn intercepts(&self) -> bool {
        !matches!(self, Self::Off)
    }

    /// Whether the frame console may be used
    pub fn evalex(&self) -> bool {
        matches!(self, Self::Debug)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Toolbar Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default panels built for each instrumented request
pub const DEFAULT_PANELS: &[&str] = &["headers", "request_vars", "logging", "traceback"];

/// Default panels built once per engine
pub const DEFAULT_GLOBAL_PANELS: &[&str] = &["routes", "configuration", "middlewares", "versions"];

pub const DEFAULT_REDIRECT_CODES: &[u16] = &[301, 302, 303, 307, 308];

/// Toolbar configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ToolbarConfig {
    /// Master switch; disabled means every request passes straight through
    pub enabled: bool,
    /// Client networks allowed to be instrumented and to use the control endpoints
    pub hosts: Vec<String>,
    /// URL prefix of the control endpoints, without trailing slash
    pub prefix: String,
    pub intercept_exc: InterceptMode,
    /// Replace redirects with an interstitial page
    pub intercept_redirects: bool,
    pub redirect_codes: Vec<u16>,
    /// Path prefixes that are never instrumented (the toolbar prefix always is excluded)
    pub exclude: Vec<String>,
    /// Request panel names, in display order
    pub panels: Vec<String>,
    /// Global panel names, in display order
    pub global_panels: Vec<String>,
    /// Largest HTML body (bytes) buffered for marker injection
    pub max_body_inject: usize,
    /// Largest form body (bytes) buffered for the request vars panel
    pub max_form_body: usize,
}

impl Default for ToolbarConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hosts: vec!["127.0.0.1".to_string(), "::1".to_string()],
            prefix: "/_debug".to_string(),
            intercept_exc: InterceptMode::Debug,
            intercept_redirects: true,
            redirect_codes: DEFAULT_REDIRECT_CODES.to_vec(),
            exclude: Vec::new(),
            panels: DEFAULT_PANELS.iter().map(|s| s.to_string()).collect(),
            global_panels: DEFAULT_GLOBAL_PANELS.iter().map(|s| s.to_string()).collect(),
            max_body_inject: 8 * 1024 * 1024,
            max_form_body: 64 * 1024,
        }
    }
}

/// Toolbar settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileToolbar {
    pub enabled: Option<bool>,
    pub hosts: Option<Vec<String>>,
    pub prefix: Option<String>,
    pub intercept_exc: Option<String>,
    pub intercept_redirects: Option<bool>,
    pub redirect_codes: Option<Vec<u16>>,
    pub exclude: Option<Vec<String>>,
    pub panels: Option<Vec<String>>,
    pub global_panels: Option<Vec<String>>,
    pub max_body_inject: Option<usize>,
    pub max_form_body: Option<usize>,
}

impl ToolbarConfig {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileToolbar>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            enabled: file.enabled.unwrap_or(defaults.enabled),
            hosts: file.hosts.unwrap_or(defaults.hosts),
            prefix: normalize_prefix(&file.prefix.unwrap_or(defaults.prefix)),
            intercept_exc: file
                .intercept_exc
                .map(|s| InterceptMode::from_str(&s))
                .unwrap_or(defaults.intercept_exc),
            intercept_redirects: file.intercept_redirects.unwrap_or(defaults.intercept_redirects),
            redirect_codes: file.redirect_codes.unwrap_or(defaults.redirect_codes),
            exclude: file.exclude.unwrap_or(defaults.exclude),
            panels: file.panels.unwrap_or(defaults.panels),
            global_panels: file.global_panels.unwrap_or(defaults.global_panels),
            max_body_inject: file.max_body_inject.unwrap_or(defaults.max_body_inject),
            max_form_body: file.max_form_body.unwrap_or(defaults.max_form_body),
        }
    }
}

/// `debug/` → `/debug`, `/` → `/_debug`
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        return "/_debug".to_string();
    }
    format!("/{}", trimmed)
}

// ─────────────────────────────────────────────────────────────────────────────
// History Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Capacities of the bounded histories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    pub requests: usize,
    pub exceptions: usize,
    pub frames: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            requests: 50,
            exceptions: 50,
            frames: 100,
        }
    }
}

/// History settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileHistory {
    pub requests: Option<usize>,
    pub exceptions: Option<usize>,
    pub frames: Option<usize>,
}

impl HistoryConfig {
    /// Create from file config with defaults; zero capacities are raised to 1
    pub fn from_file(file: Option<FileHistory>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            requests: at_least_one("history.requests", file.requests.unwrap_or(defaults.requests)),
            exceptions: at_least_one(
                "history.exceptions",
                file.exceptions.unwrap_or(defaults.exceptions),
            ),
            frames: at_least_one("history.frames", file.frames.unwrap_or(defaults.frames)),
        }
    }
}

fn at_least_one(key: &str, value: usize) -> usize {
    if value == 0 {
        tracing::warn!(key, "History capacity of 0 is not allowed; using 1");
        1
    } else {
        value
    }
}
