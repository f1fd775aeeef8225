//! LineRelay Web Server - fast webhook acknowledgment and relay.
//!
//! This binary provides a thin, fast web server that:
//! - Receives webhook callbacks from the LINE platform
//! - Acknowledges them immediately with 200 OK
//! - Verifies signatures for logging only
//! - Forwards payloads to the configured downstream URL in the background
//!
//! Downstream failures never reach the platform; they are logged and dropped.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use linerelay::web::{router, AppState};
use linerelay::{Config, Forwarder};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("relay_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        signature_verification_configured = config.channel_secret.is_some(),
        forward_url_configured = config.forward_url.is_some(),
        forward_timeout_ms = config.forward_timeout_ms,
        drain_timeout_ms = config.drain_timeout_ms,
        "config_loaded"
    );

    // Create the downstream forwarder
    let forwarder = Forwarder::new(&config)?;
    info!("forwarder_created");

    // Create application state
    let state = AppState::new(config.clone(), forwarder.clone());

    // Build the router
    let app = router(state).layer(TraceLayer::new_for_http());

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "relay_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Let in-flight forwards finish before exiting
    forwarder
        .drain(Duration::from_millis(config.drain_timeout_ms))
        .await;

    info!("relay_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("relay_shutting_down");
}
