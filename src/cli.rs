// CLI module - command-line argument parsing and handlers
//
// Without a subcommand the demo server runs. Configuration subcommands:
// - config --show: Display effective configuration
// - config --path: Show config file path
// - config --reset: Regenerate config file with defaults
// - config --edit: Open config file in $EDITOR

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use debug_toolbar::config::{Config, VERSION};
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

/// Debug toolbar - in-browser debugging for axum applications
#[derive(Parser)]
#[command(name = "debug-toolbar")]
#[command(version = VERSION)]
#[command(about = "Debug toolbar demo server", long_about = None)]
pub struct Cli {
    /// Run the demo server without instrumentation
    #[arg(long, global = true)]
    pub no_toolbar: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Open config file in $EDITOR
        #[arg(long)]
        edit: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

/// Run a CLI subcommand if one was given
///
/// Returns true when a subcommand ran and the process should exit.
pub fn handle_cli(cli: &Cli) -> bool {
    let Some(Commands::Config {
        show,
        reset,
        edit,
        path,
    }) = &cli.command
    else {
        return false;
    };

    let result = if *path {
        config_file().map(|path| println!("{}", path.display()))
    } else if *show {
        show_config()
    } else if *reset {
        reset_config()
    } else if *edit {
        edit_config()
    } else {
        println!("Usage: debug-toolbar config [--show|--reset|--edit|--path]");
        Ok(())
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
    true
}

fn config_file() -> Result<PathBuf> {
    Config::config_path().context("could not determine the config directory")
}

fn show_config() -> Result<()> {
    let config = Config::from_env()?;

    println!("# Effective configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());
    println!();

    let path = config_file()?;
    if path.exists() {
        println!("# Source: {}", path.display());
    } else {
        println!("# Source: defaults (no config file)");
    }
    Ok(())
}

fn reset_config() -> Result<()> {
    let path = config_file()?;

    if path.exists() && !confirm(&format!("Overwrite {}?", path.display()))? {
        println!("Aborted.");
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(&path, Config::default().to_toml())
        .with_context(|| format!("writing {}", path.display()))?;

    println!("Config reset to defaults: {}", path.display());
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N] ");
    std::io::stderr().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

fn edit_config() -> Result<()> {
    let path = config_file()?;
    if !path.exists() {
        Config::ensure_config_exists();
    }

    let editor = std::env::var("EDITOR")
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| if cfg!(windows) { "notepad" } else { "nano" }.to_string());

    let status = Command::new(&editor)
        .arg(&path)
        .status()
        .with_context(|| format!("launching editor '{editor}' (set $EDITOR)"))?;
    if !status.success() {
        bail!("editor exited with {status}");
    }
    Ok(())
}
