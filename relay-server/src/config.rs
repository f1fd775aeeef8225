//! Configuration module for environment variable parsing.
//!
//! Reads all configuration from environment variables once at startup.

use std::env;

use tracing::warn;
use url::Url;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// LINE channel secret for webhook signature verification
    pub channel_secret: Option<String>,

    /// Downstream URL that acknowledged payloads are forwarded to
    pub forward_url: Option<Url>,

    /// HTTP request timeout in milliseconds for the outbound forward
    pub forward_timeout_ms: u64,

    /// Maximum time in milliseconds to wait for in-flight forwards at shutdown
    pub drain_timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),

            channel_secret: env::var("LINE_CHANNEL_SECRET").ok(),

            forward_url: parse_url("FORWARD_URL"),

            forward_timeout_ms: env::var("FORWARD_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10000),

            drain_timeout_ms: env::var("DRAIN_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30000),
        }
    }
}

/// Parse an environment variable as an absolute URL.
///
/// Unset or empty variables return `None`. Invalid values log a warning and
/// return `None` so forwarding degrades to a no-op instead of failing startup.
fn parse_url(name: &str) -> Option<Url> {
    let raw = env::var(name).ok()?;

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    match Url::parse(trimmed) {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(env_var = name, value = %raw, error = %e, "Invalid URL, ignoring");
            None
        }
    }
}
