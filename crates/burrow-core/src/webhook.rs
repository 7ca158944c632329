//! Webhook signature verification.
//!
//! GitHub signs each delivery with HMAC-SHA256 over the raw body, sent in
//! the `X-Hub-Signature-256` header as `sha256=<hex>`. An invalid or
//! missing signature rejects the delivery before any payload is decoded.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use crate::error::{BurrowError, Result};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute the webhook signature for a payload, in header format
/// (`sha256=<hex>`). Used by tests and by outbound delivery simulation.
pub fn compute_webhook_signature(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a webhook delivery against the configured secret.
///
/// Returns `InvalidWebhook` on any mismatch; the caller must not touch
/// stored state in that case.
pub fn verify_webhook_signature(secret: &str, signature_header: &str, body: &[u8]) -> Result<()> {
    let Some(expected_hex) = signature_header.strip_prefix(SIGNATURE_PREFIX) else {
        warn!("webhook signature header missing 'sha256=' prefix");
        return Err(BurrowError::InvalidWebhook(
            "signature header missing sha256= prefix".to_string(),
        ));
    };

    let expected = hex::decode(expected_hex)
        .map_err(|_| BurrowError::InvalidWebhook("signature is not valid hex".to_string()))?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| {
        warn!("webhook signature verification failed");
        BurrowError::InvalidWebhook("signature mismatch".to_string())
    })
}
