// Startup module - displays banner and toolbar settings
//
// Printed once before the demo server starts serving.

use debug_toolbar::config::{Config, VERSION};

/// ANSI color codes for terminal output
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const MAGENTA: &str = "\x1b[35m";
}

/// One line of the settings summary
struct SettingStatus {
    name: &'static str,
    enabled: bool,
    description: String,
}

/// Print the startup banner and toolbar settings
pub fn print_startup(config: &Config) {
    use colors::*;

    println!();
    println!("  {BOLD}{CYAN}Debug Toolbar{RESET} {DIM}v{VERSION}{RESET}");
    println!("  {DIM}In-browser debugging for axum applications{RESET}");
    println!();

    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("  {DIM}Config:{RESET} {GREEN}✓{RESET} {}", path.display());
        } else {
            println!("  {DIM}Config:{RESET} {DIM}(using defaults){RESET}");
        }
    }
    println!();

    for setting in settings(config) {
        print_setting(&setting);
    }
    println!();

    println!(
        "  {MAGENTA}▸{RESET} Demo app on {BOLD}http://{}{RESET}",
        config.bind_addr
    );
    if config.toolbar.enabled {
        println!(
            "  {MAGENTA}▸{RESET} Toolbar at {BOLD}http://{}{}{RESET}",
            config.bind_addr, config.toolbar.prefix
        );
    } else {
        println!("  {YELLOW}▸{RESET} {YELLOW}Toolbar disabled{RESET}");
    }
    println!();
}

fn settings(config: &Config) -> Vec<SettingStatus> {
    let toolbar = &config.toolbar;
    vec![
        SettingStatus {
            name: "toolbar",
            enabled: toolbar.enabled,
            description: format!("hosts {}", toolbar.hosts.join(", ")),
        },
        SettingStatus {
            name: "exceptions",
            enabled: toolbar.intercept_exc.intercepts(),
            description: format!("intercept_exc = {}", toolbar.intercept_exc.as_str()),
        },
        SettingStatus {
            name: "redirects",
            enabled: toolbar.intercept_redirects,
            description: "interstitial page".to_string(),
        },
        SettingStatus {
            name: "panels",
            enabled: !toolbar.panels.is_empty(),
            description: toolbar.panels.join(", "),
        },
        SettingStatus {
            name: "file-logs",
            enabled: config.logging.file_enabled,
            description: config.logging.file_dir.display().to_string(),
        },
    ]
}

fn print_setting(setting: &SettingStatus) {
    use colors::*;

    let (icon, style) = if setting.enabled {
        (format!("{GREEN}✓{RESET}"), "")
    } else {
        (format!("{DIM}○{RESET}"), DIM)
    };

    println!(
        "    {icon} {style}{:<12}{RESET} {DIM}{}{RESET}",
        setting.name, setting.description
    );
}
