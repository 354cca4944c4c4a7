//! Config serialization to TOML
//!
//! Single source of truth for config file format.

use super::Config;

/// TOML string literal with escaping
fn quote(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}

fn string_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| quote(s)).collect();
    format!("[{}]", quoted.join(", "))
}

impl Config {
    /// Serialize config to TOML string
    ///
    /// Every field is written so the file doubles as documentation of the
    /// available settings.
    pub fn to_toml(&self) -> String {
        let toolbar = &self.toolbar;
        let history = &self.history;
        let capture = &self.capture;
        let logging = &self.logging;

        format!(
            r#"# debug-toolbar configuration

# Demo server bind address
bind_addr = {bind}

[toolbar]
# Master switch (DEBUG_TOOLBAR_ENABLED env var overrides)
enabled = {enabled}
# Client addresses or CIDR networks allowed to see the toolbar
hosts = {hosts}
# URL prefix of the toolbar's own endpoints
prefix = {prefix}
# Failure interception: debug (traceback + console), display (traceback), off
intercept_exc = {intercept}
# Replace redirects with an interstitial page
intercept_redirects = {intercept_redirects}
redirect_codes = {redirect_codes:?}
# Path prefixes that are never instrumented
exclude = {exclude}
# Panels, in display order
panels = {panels}
global_panels = {global_panels}
# Body size limits in bytes
max_body_inject = {max_body_inject}
max_form_body = {max_form_body}

# Bounded histories (oldest entries are evicted)
[history]
requests = {requests}
exceptions = {exceptions}
frames = {frames}

# Traceback capture
[capture]
skip_frames = {skip_frames}
hide_system_frames = {hide_system}
system_prefixes = {system_prefixes}
context_lines = {context_lines}
max_value_len = {max_value_len}

# Logging configuration (RUST_LOG env var overrides)
[logging]
level = {log_level}
# File logging (in addition to stdout)
file_enabled = {log_file_enabled}
file_dir = {log_file_dir}
file_rotation = {log_file_rotation}  # hourly, daily, never
file_prefix = {log_file_prefix}
"#,
            bind = quote(&self.bind_addr.to_string()),
            enabled = toolbar.enabled,
            hosts = string_list(&toolbar.hosts),
            prefix = quote(&toolbar.prefix),
            intercept = quote(toolbar.intercept_exc.as_str()),
            intercept_redirects = toolbar.intercept_redirects,
            redirect_codes = toolbar.redirect_codes,
            exclude = string_list(&toolbar.exclude),
            panels = string_list(&toolbar.panels),
            global_panels = string_list(&toolbar.global_panels),
            max_body_inject = toolbar.max_body_inject,
            max_form_body = toolbar.max_form_body,
            requests = history.requests,
            exceptions = history.exceptions,
            frames = history.frames,
            skip_frames = capture.skip_frames,
            hide_system = capture.hide_system_frames,
            system_prefixes = string_list(&capture.system_prefixes),
            context_lines = capture.context_lines,
            max_value_len = capture.max_value_len,
            log_level = quote(&logging.level),
            log_file_enabled = logging.file_enabled,
            log_file_dir = quote(&logging.file_dir.display().to_string()),
            log_file_rotation = quote(logging.file_rotation.as_str()),
            log_file_prefix = quote(&logging.file_prefix),
        )
    }
}
