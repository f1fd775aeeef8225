//! LineRelay - webhook relay for LINE platform callbacks.
//!
//! This library backs the `linerelay-web` binary, a thin server that:
//! - Acknowledges LINE webhooks immediately
//! - Verifies request signatures for observability
//! - Forwards payloads to a configured downstream endpoint in the background
//!
//! ## Architecture
//!
//! ```text
//! LINE platform → Web Server → ack 200 OK
//!                      ↘ forwarder (background task) → downstream endpoint
//! ```

pub mod config;
pub mod forward;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use forward::{ForwardError, Forwarder};
pub use web::AppState;
