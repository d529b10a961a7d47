//! Chargify webhook signature verification.
//!
//! Chargify signs the raw request body with the site's shared key and sends
//! the hex HMAC-SHA256 in `X-Chargify-Webhook-Signature-Hmac-Sha-256`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::WebhookError;

/// Header carrying the hex HMAC-SHA256 of the body.
pub const SIGNATURE_HEADER: &str = "X-Chargify-Webhook-Signature-Hmac-Sha-256";

/// Header carrying the webhook id.
pub const WEBHOOK_ID_HEADER: &str = "X-Chargify-Webhook-Id";

/// Verifier for Chargify webhook signatures.
pub struct ChargifyWebhookVerifier {
    shared_key: String,
}

impl ChargifyWebhookVerifier {
    pub fn new(shared_key: impl Into<String>) -> Self {
        Self {
            shared_key: shared_key.into(),
        }
    }

    /// Checks `signature_hex` against the body.
    ///
    /// # Errors
    ///
    /// - `ParseError` - signature is not hex
    /// - `InvalidSignature` - signature does not match
    pub fn verify(&self, body: &[u8], signature_hex: &str) -> Result<(), WebhookError> {
        let provided = hex::decode(signature_hex.trim())
            .map_err(|_| WebhookError::ParseError("invalid signature hex".to_string()))?;
        let expected = self.compute_signature(body)?;

        if !constant_time_compare(&expected, &provided) {
            tracing::warn!("Chargify webhook signature mismatch");
            return Err(WebhookError::InvalidSignature);
        }
        Ok(())
    }

    fn compute_signature(&self, body: &[u8]) -> Result<Vec<u8>, WebhookError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.shared_key.as_bytes())
            .map_err(|_| WebhookError::InvalidSignature)?;
        mac.update(body);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Performs constant-time comparison of two byte slices.
pub(crate) fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Computes the webhook signature for use in test fixtures.
#[cfg(test)]
pub fn compute_test_signature(shared_key: &str, body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(shared_key.as_bytes()).expect("HMAC accepts any key");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
