//! Webhook endpoint handlers.
//!
//! The relay handler is designed to acknowledge as fast as possible - it only:
//! 1. Captures the raw body and parses it
//! 2. Verifies the signature (for logging, never for rejection)
//! 3. Hands the payload to the forwarder and returns 200 OK
//!
//! Forwarding happens on background tasks; the platform calling us never
//! waits on the downstream endpoint.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::forward::Forwarder;
use crate::web::signature::{is_signature_verification_enabled, verify_line_signature};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub forwarder: Forwarder,
}

impl AppState {
    pub fn new(config: Config, forwarder: Forwarder) -> Self {
        Self {
            config: Arc::new(config),
            forwarder,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// LINE Webhook
// =============================================================================

/// LINE webhook endpoint.
///
/// This endpoint:
/// 1. Acknowledges with 200 OK, whatever the body contains
/// 2. Verifies the HMAC signature over the raw bytes (if configured)
/// 3. Spawns the downstream forward and returns without waiting on it
///
/// The signature outcome never changes the response. LINE retries deliveries
/// that are not acknowledged quickly, so rejecting or blocking here would
/// only cause duplicate traffic.
pub async fn line_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get("x-line-signature")
        .and_then(|v| v.to_str().ok());

    info!(
        body_length = body.len(),
        has_signature = signature.is_some(),
        "line_webhook_received"
    );

    // Parse before anything else; a malformed body is still acknowledged
    let payload: Option<Value> = match serde_json::from_slice(&body) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                error = %e,
                body_preview = %body_preview(&body),
                "line_webhook_parse_failed"
            );
            None
        }
    };

    if let Some(payload) = &payload {
        info!(
            payload = %serde_json::to_string_pretty(payload).unwrap_or_default(),
            "line_webhook_payload"
        );
    }

    // Verify signature if a channel secret is configured. The outcome is
    // logged and nothing more: forwarding stays best-effort either way.
    if is_signature_verification_enabled(&state.config.channel_secret) {
        let secret = state.config.channel_secret.as_deref().unwrap_or_default();
        match signature {
            Some(sig) if verify_line_signature(secret, sig, &body) => {
                info!("line_signature_verified");
            }
            Some(_) => {
                warn!("line_signature_invalid");
            }
            None => {
                warn!("line_signature_header_missing");
            }
        }
    } else {
        warn!("line_signature_verification_disabled");
    }

    // The forward task outlives this handler and logs its own result
    if let Some(payload) = payload {
        state.forwarder.spawn(payload);
    }

    (StatusCode::OK, "OK")
}

/// First bytes of a body for diagnostics, lossy-decoded.
fn body_preview(body: &[u8]) -> String {
    let end = body.len().min(256);
    String::from_utf8_lossy(&body[..end]).into_owned()
}
