//! LINE webhook signature verification.
//!
//! LINE signs webhook requests using HMAC-SHA256 over the raw request body.
//! Reference: https://developers.line.biz/en/reference/messaging-api/#signature-validation

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Compute the expected signature for a raw request body.
///
/// Returns `base64(HMAC-SHA256(channel_secret, body))`, or `None` if the
/// secret cannot be used as an HMAC key.
pub fn compute_line_signature(channel_secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(channel_secret.as_bytes()).ok()?;
    mac.update(body);
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Verify a LINE webhook signature.
///
/// LINE signs the exact raw request body with HMAC-SHA256 under the channel
/// secret and sends the base64 digest in the `x-line-signature` header. The
/// digest must be computed over the original bytes; re-serializing the parsed
/// JSON would change whitespace and key order and break equality.
///
/// # Arguments
///
/// * `channel_secret` - The LINE channel secret
/// * `signature` - The value of the `x-line-signature` request header
/// * `body` - The raw request body bytes, exactly as received
///
/// # Returns
///
/// `true` if the signature matches, `false` otherwise.
pub fn verify_line_signature(channel_secret: &str, signature: &str, body: &[u8]) -> bool {
    // Check for empty inputs
    if channel_secret.is_empty() || signature.is_empty() {
        warn!(
            has_channel_secret = !channel_secret.is_empty(),
            has_signature = !signature.is_empty(),
            "line_signature_missing_fields"
        );
        return false;
    }

    // Compute expected signature: base64(HMAC-SHA256(channel_secret, body))
    let expected_signature = match compute_line_signature(channel_secret, body) {
        Some(s) => s,
        None => {
            warn!("line_signature_invalid_key");
            return false;
        }
    };

    // Constant-time comparison to prevent timing attacks
    let valid = constant_time_compare(&expected_signature, signature);

    if !valid {
        warn!(
            expected_length = expected_signature.len(),
            actual_length = signature.len(),
            body_length = body.len(),
            "line_signature_mismatch"
        );
    }

    valid
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Check if LINE signature verification is enabled.
pub fn is_signature_verification_enabled(channel_secret: &Option<String>) -> bool {
    channel_secret
        .as_ref()
        .map(|k| !k.trim().is_empty())
        .unwrap_or(false)
}
