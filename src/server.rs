//! Demo server setup

use std::net::SocketAddr;

use anyhow::{Context, Result};
use debug_toolbar::{config::Config, Toolbar};
use tokio::net::TcpListener;

use crate::demo;

/// Serve the demo app until `shutdown_rx` fires
pub async fn start_server(
    config: Config,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<()> {
    let bind_addr = config.bind_addr;

    let toolbar = Toolbar::builder(config).app(demo::app_info()).build();
    if toolbar.config().toolbar.enabled {
        tracing::info!(
            "Debug toolbar enabled at {} (intercept_exc = {})",
            toolbar.prefix(),
            toolbar.config().toolbar.intercept_exc.as_str()
        );
    } else {
        tracing::info!("Debug toolbar disabled; requests pass straight through");
    }

    // Control endpoints + instrumentation around the demo routes
    let app = toolbar.attach(demo::router());

    tracing::info!("Starting demo server on {}", bind_addr);

    let listener = TcpListener::bind(bind_addr)
        .await
        .context("Failed to bind to address")?;

    tracing::info!("Demo server listening on {}", bind_addr);

    // The toolbar's host check needs the peer address
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_rx.await.ok();
    })
    .await
    .context("Server error")?;

    tracing::info!("Demo server shut down gracefully");
    Ok(())
}
