//! Web server module for handling inbound webhooks.
//!
//! This module provides a thin, fast web server that:
//! - Receives webhook callbacks from the LINE platform
//! - Verifies the request signature for observability
//! - Acknowledges immediately and forwards payloads in the background
//!
//! The downstream endpoint never makes the platform wait: forwarding runs
//! on detached tasks owned by the forwarder.

pub mod handlers;
pub mod signature;

use axum::{
    routing::{get, post},
    Router,
};

pub use handlers::{health, line_webhook, AppState, HealthResponse};
pub use signature::{
    compute_line_signature, is_signature_verification_enabled, verify_line_signature,
};

/// Build the relay's route table.
///
/// `GET /` doubles as the hosting platform's health probe.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/webhook", post(line_webhook))
        .with_state(state)
}
