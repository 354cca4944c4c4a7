// Debug toolbar demo server
//
// Serves a small axum app with the toolbar attached, so every feature can be
// tried from a browser: traceback pages with the frame console, the request
// panels, redirect interception and the request history.

mod cli;
mod demo;
mod server;
mod startup;

use anyhow::Result;
use clap::Parser;
use debug_toolbar::config::{Config, ConfigError, LoggingConfig};
use debug_toolbar::{FrameLayer, RequestLogLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Handle CLI commands first (config --show, --reset, --edit, --path)
    let cli = cli::Cli::parse();
    if cli::handle_cli(&cli) {
        return Ok(());
    }

    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            report_config_error(&e);
            std::process::exit(1);
        }
    };
    if cli.no_toolbar {
        config.toolbar.enabled = false;
    }

    // The guard must be kept alive for the duration of the program to ensure logs flush
    let _file_guard = init_logging(&config.logging, config.capture.max_value_len);

    startup::print_startup(&config);

    // Create shutdown channel for graceful server shutdown
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let mut server = tokio::spawn(server::start_server(config, shutdown_rx));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Shutdown requested");
            let _ = shutdown_tx.send(());
            server.await??;
        }
        result = &mut server => {
            // Server exited on its own (bind failure etc.)
            result??;
        }
    }

    Ok(())
}

/// Initialize tracing: stdout, optional JSON files, and the toolbar's layers
///
/// Precedence: RUST_LOG env var > config file > default "info"
fn init_logging(
    logging: &LoggingConfig,
    max_value_len: usize,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.default_filter().into());

    // Non-blocking rolling file writer (writes happen in background thread)
    let (file_layer, guard) = if logging.file_enabled {
        match std::fs::create_dir_all(&logging.file_dir) {
            Ok(()) => {
                let appender = logging
                    .file_rotation
                    .appender(&logging.file_dir, &logging.file_prefix);
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_ansi(false);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not create log directory {:?}: {}",
                    logging.file_dir, e
                );
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(FrameLayer::new(max_value_len))
        .with(RequestLogLayer::new())
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

/// Print a clear, actionable error for a broken config file
fn report_config_error(error: &ConfigError) {
    eprintln!("\n╔══════════════════════════════════════════════════════════════╗");
    eprintln!("║  CONFIG ERROR - Failed to load configuration                 ║");
    eprintln!("╚══════════════════════════════════════════════════════════════╝\n");
    eprintln!("  Error: {}\n", error);
    match error {
        ConfigError::Parse { .. } => {
            eprintln!("  Tip: Check for:\n");
            eprintln!("    - Missing quotes around string values");
            eprintln!("    - Invalid boolean values (use true/false)");
            eprintln!("    - Malformed array syntax");
            eprintln!("    - Typos in section names\n");
        }
        ConfigError::Read { .. } => {
            eprintln!("  Tip: Check the file's permissions.\n");
        }
        ConfigError::Invalid { .. } => {
            eprintln!("  Tip: Check the value in the config file and DEBUG_TOOLBAR_* env vars.\n");
        }
    }
    eprintln!("  To reset, run `debug-toolbar config --reset`.\n");
}
