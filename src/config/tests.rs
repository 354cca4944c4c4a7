//! Configuration tests
//!
//! Round-trip tests guard the serializer: every field written by `to_toml`
//! must parse back to the same value.

use super::*;
use std::collections::HashMap;

// ─────────────────────────────────────────────────────────────────────────────
// Round-trip tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_roundtrip_default() {
    let config = Config::default();
    let toml_str = config.to_toml();

    let parsed = Config::from_toml_str(&toml_str);
    assert!(
        parsed.is_ok(),
        "Default config should round-trip.\nTOML:\n{}\nError: {:?}",
        toml_str,
        parsed.as_ref().err()
    );
    assert_eq!(parsed.unwrap(), config);
}

#[test]
fn test_config_roundtrip_customized() {
    let mut config = Config::default();
    config.bind_addr = "0.0.0.0:8080".parse().unwrap();
    config.toolbar.hosts = vec!["10.0.0.0/8".to_string(), "::1".to_string()];
    config.toolbar.prefix = "/__toolbar".to_string();
    config.toolbar.intercept_exc = InterceptMode::Display;
    config.toolbar.intercept_redirects = false;
    config.toolbar.exclude = vec!["/static".to_string(), "/health \"check\"".to_string()];
    config.toolbar.panels = vec!["headers".to_string()];
    config.history.frames = 7;
    config.capture.system_prefixes = vec!["tokio".to_string()];
    config.capture.context_lines = 2;
    config.logging.file_rotation = LogRotation::Never;

    let parsed = Config::from_toml_str(&config.to_toml()).unwrap();
    assert_eq!(parsed, config);
}

// ─────────────────────────────────────────────────────────────────────────────
// Defaults and precedence
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_empty_file_uses_defaults() {
    let config = Config::from_toml_str("").unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.toolbar.prefix, "/_debug");
    assert_eq!(config.toolbar.intercept_exc, InterceptMode::Debug);
    assert!(config.toolbar.intercept_redirects);
    assert_eq!(config.history.requests, 50);
    assert_eq!(config.history.exceptions, 50);
    assert_eq!(config.history.frames, 100);
}

#[test]
fn test_partial_section_keeps_other_defaults() {
    let config = Config::from_toml_str(
        r#"
[toolbar]
prefix = "tools/"
intercept_exc = "false"
"#,
    )
    .unwrap();
    assert_eq!(config.toolbar.prefix, "/tools");
    assert_eq!(config.toolbar.intercept_exc, InterceptMode::Off);
    assert_eq!(config.toolbar.panels, ToolbarConfig::default().panels);
}

#[test]
fn test_zero_capacity_raised_to_one() {
    let config = Config::from_toml_str("[history]\nrequests = 0\n").unwrap();
    assert_eq!(config.history.requests, 1);
}

#[test]
fn test_env_overrides_file() {
    let file: FileConfig = toml::from_str(
        r#"
bind_addr = "127.0.0.1:9000"
[toolbar]
enabled = true
intercept_exc = "debug"
"#,
    )
    .unwrap();
    let env: HashMap<&str, &str> = [
        ("DEBUG_TOOLBAR_BIND", "127.0.0.1:7000"),
        ("DEBUG_TOOLBAR_ENABLED", "off"),
        ("DEBUG_TOOLBAR_INTERCEPT", "display"),
    ]
    .into_iter()
    .collect();

    let config = Config::from_sources(file, |k| env.get(k).map(|v| v.to_string())).unwrap();
    assert_eq!(config.bind_addr.port(), 7000);
    assert!(!config.toolbar.enabled);
    assert_eq!(config.toolbar.intercept_exc, InterceptMode::Display);
}

#[test]
fn test_invalid_values_are_errors() {
    let err = Config::from_toml_str("bind_addr = \"nowhere\"").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { key: "bind_addr", .. }));

    let err = Config::from_sources(FileConfig::default(), |k| {
        (k == "DEBUG_TOOLBAR_ENABLED").then(|| "maybe".to_string())
    })
    .unwrap_err();
    assert!(err.to_string().contains("DEBUG_TOOLBAR_ENABLED"));

    let err = Config::from_toml_str("[toolbar\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn test_intercept_mode_parsing() {
    assert_eq!(InterceptMode::from_str("DEBUG"), InterceptMode::Debug);
    assert_eq!(InterceptMode::from_str("display"), InterceptMode::Display);
    assert_eq!(InterceptMode::from_str("none"), InterceptMode::Off);
    assert_eq!(InterceptMode::from_str("bogus"), InterceptMode::Debug);
    assert!(InterceptMode::Display.intercepts());
    assert!(!InterceptMode::Display.evalex());
    assert!(!InterceptMode::Off.intercepts());
}

#[test]
fn test_normalize_prefix() {
    assert_eq!(normalize_prefix("debug/"), "/debug");
    assert_eq!(normalize_prefix("/a/b/"), "/a/b");
    assert_eq!(normalize_prefix("/"), "/_debug");
}

#[test]
fn test_logging_section() {
    let config = Config::from_toml_str(
        "[logging]\nlevel = \"debug\"\nfile_rotation = \"hourly\"\nfile_dir = \"/var/log/tb\"\n",
    )
    .unwrap();
    assert_eq!(config.logging.file_rotation, LogRotation::Hourly);
    assert_eq!(config.logging.file_dir, std::path::PathBuf::from("/var/log/tb"));
    assert_eq!(config.logging.file_prefix, "debug-toolbar");
    assert_eq!(
        config.logging.default_filter(),
        "debug_toolbar=debug,debug,tower_http=debug"
    );

    let err = Config::from_toml_str("[logging]\nfile_rotation = \"weekly\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}
