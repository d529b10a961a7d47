//! Chargify Direct request signing.

use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::DirectError;
use crate::domain::webhook::constant_time_compare;

/// Credentials of a Chargify Direct API key pair.
#[derive(Clone)]
pub struct DirectSigner {
    api_id: String,
    api_secret: String,
}

impl DirectSigner {
    pub fn new(api_id: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_id: api_id.into(),
            api_secret: api_secret.into(),
        }
    }

    pub fn api_id(&self) -> &str {
        &self.api_id
    }

    /// Hex HMAC-SHA1 of `api_id ‖ timestamp ‖ nonce ‖ parts...` keyed with the
    /// API secret.
    pub fn sign(&self, timestamp: &str, nonce: &str, parts: &[&str]) -> Result<String, DirectError> {
        let mut mac = Hmac::<Sha1>::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| DirectError::Signing(e.to_string()))?;
        mac.update(self.api_id.as_bytes());
        mac.update(timestamp.as_bytes());
        mac.update(nonce.as_bytes());
        for part in parts {
            mac.update(part.as_bytes());
        }
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Compares a received signature with the locally computed one.
    pub fn matches(
        &self,
        signature: &str,
        timestamp: &str,
        nonce: &str,
        parts: &[&str],
    ) -> Result<bool, DirectError> {
        let expected = self.sign(timestamp, nonce, parts)?;
        Ok(constant_time_compare(expected.as_bytes(), signature.as_bytes()))
    }
}

impl std::fmt::Debug for DirectSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectSigner")
            .field("api_id", &self.api_id)
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}
